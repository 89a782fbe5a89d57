//! Multi-step app (pipeline) models.
//!
//! An `App` is an ordered list of `AppStep`s; an `AppExecution` is one run
//! of that pipeline for a user. Step configs declare, per input field,
//! where its value comes from at execution time.

use std::collections::BTreeMap;

use pixelforge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use super::status::StatusId;
use crate::error::StoreError;

/// A row from the `apps` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct App {
    pub id: DbId,
    pub name: String,
    pub created_at: Timestamp,
}

/// Where a step field's value comes from.
///
/// Serialized in the step `config` column as
/// `{"<field>": {"source": "user", "key": "subject"}, ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FieldSource {
    /// A fixed value baked into the step config. May itself be
    /// JSON-encoded and is decoded opportunistically.
    Static { value: Value },
    /// A value from the execution's original inputs, with an optional
    /// fallback. `key` defaults to the field's own name.
    User {
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        default: Option<Value>,
    },
    /// A dot-path lookup into a previous step's recorded output.
    Previous {
        /// 1-based order of the step whose output to read.
        step: i32,
        /// Dot-path into that step's output, e.g. `"result"`.
        output_key: String,
    },
    /// Concatenation of a static default plus named user-input arrays into
    /// one flat array, dropping empty/null entries.
    MergeArrays {
        #[serde(default)]
        default: Vec<Value>,
        #[serde(default)]
        user_keys: Vec<String>,
    },
    /// A text template with `{field}` tokens resolved against the
    /// execution inputs.
    Template { template: String },
}

/// A row from the `app_steps` table. Read-only to the core.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AppStep {
    pub id: DbId,
    pub app_id: DbId,
    /// 1-based position within the app.
    pub step_order: i32,
    pub model_id: DbId,
    /// Text template with `{field}` tokens, a distinct token syntax from
    /// provider `{{field}}` templates.
    pub prompt_template: String,
    /// Raw per-field resolution config (JSONB).
    pub config: Value,
    pub requires_approval: bool,
}

impl AppStep {
    /// Parse the `config` column into field-name keyed [`FieldSource`]s.
    ///
    /// A `BTreeMap` keeps resolution order deterministic.
    pub fn parse_config(&self) -> Result<BTreeMap<String, FieldSource>, StoreError> {
        if self.config.is_null() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_value(self.config.clone())?)
    }
}

/// A row from the `app_executions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AppExecution {
    pub id: DbId,
    pub app_id: DbId,
    pub user_id: DbId,
    pub status_id: StatusId,
    /// 1-based order of the next step to run. Non-decreasing.
    pub current_step: i32,
    /// User-supplied inputs, fixed for the run.
    pub inputs: Value,
    /// Step order (as string key) to that step's recorded output, plus a
    /// reserved `"error"` slot.
    pub history: Value,
    /// Step order (as string key) to the Generation id it produced.
    pub generation_ids: Value,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AppExecution {
    /// History slot for a step, if recorded.
    pub fn history_entry(&self, step_order: i32) -> Option<&Value> {
        self.history.get(step_order.to_string())
    }
}

/// DTO for creating an execution.
#[derive(Debug, Clone)]
pub struct CreateExecution {
    pub app_id: DbId,
    pub user_id: DbId,
    pub inputs: Value,
}
