//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
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

            /// Look up the variant for a database status ID.
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
    /// Transitions are monotonic (Pending -> Submitted -> Processing ->
    /// Completed/Failed) except the bounded retry loop, which moves
    /// Failed back to Pending on the same row.
    GenerationStatus {
        Pending = 1,
        Submitted = 2,
        Processing = 3,
        Completed = 4,
        Failed = 5,
        Cancelled = 6,
    }
}

define_status_enum! {
    /// Provider submission attempt status.
    ///
    /// Pending means the attempt is in flight at the provider; Success and
    /// Error are terminal.
    SubmissionStatus {
        Pending = 1,
        Success = 2,
        Error = 3,
    }
}

define_status_enum! {
    /// Provider account availability status.
    AccountStatus {
        Active = 1,
        Suspended = 2,
        Exhausted = 3,
        CoolingDown = 4,
    }
}

impl GenerationStatus {
    /// Whether this status admits no further transitions (the retry loop
    /// excepted for `Failed`).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GenerationStatus::Completed | GenerationStatus::Failed | GenerationStatus::Cancelled
        )
    }
}
