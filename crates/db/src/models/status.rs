//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Parse a database status ID back into the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Generation lifecycle status.
    ///
    /// `Completed` and `Failed` are terminal. `Processing` is only entered
    /// by long-running provider calls and always carries an operation name
    /// in `output_data`.
    GenerationStatus {
        Pending = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
    }
}

impl GenerationStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

define_status_enum! {
    /// App execution lifecycle status.
    ///
    /// `WaitingApproval` is a deliberate pause, not a failure. `Completed`
    /// and `Failed` are terminal.
    ExecutionStatus {
        Pending = 1,
        Processing = 2,
        WaitingApproval = 3,
        Completed = 4,
        Failed = 5,
    }
}

impl ExecutionStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

define_status_enum! {
    /// Background task execution status.
    TaskStatus {
        Pending = 1,
        Running = 2,
        Completed = 3,
        Failed = 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_status_ids_match_seed_data() {
        assert_eq!(GenerationStatus::Pending.id(), 1);
        assert_eq!(GenerationStatus::Processing.id(), 2);
        assert_eq!(GenerationStatus::Completed.id(), 3);
        assert_eq!(GenerationStatus::Failed.id(), 4);
    }

    #[test]
    fn execution_status_ids_match_seed_data() {
        assert_eq!(ExecutionStatus::Pending.id(), 1);
        assert_eq!(ExecutionStatus::Processing.id(), 2);
        assert_eq!(ExecutionStatus::WaitingApproval.id(), 3);
        assert_eq!(ExecutionStatus::Completed.id(), 4);
        assert_eq!(ExecutionStatus::Failed.id(), 5);
    }

    #[test]
    fn terminal_statuses() {
        assert!(GenerationStatus::Completed.is_terminal());
        assert!(GenerationStatus::Failed.is_terminal());
        assert!(!GenerationStatus::Processing.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::WaitingApproval.is_terminal());
    }

    #[test]
    fn from_id_round_trips() {
        assert_eq!(
            GenerationStatus::from_id(GenerationStatus::Processing.id()),
            Some(GenerationStatus::Processing)
        );
        assert_eq!(GenerationStatus::from_id(99), None);
        let id: StatusId = TaskStatus::Running.into();
        assert_eq!(id, 2);
    }
}
