use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::CoreError;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.0.to_string()[..8])
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(EntityId);
uuid_id!(AttachmentId);
uuid_id!(TermId);
uuid_id!(UserId);
uuid_id!(ActorId);
uuid_id!(BackupId);

impl BackupId {
    /// Parse a backup id from its string form, rejecting anything that is
    /// not a well-formed UUIDv7. Callers validate before touching storage.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let uuid = Uuid::parse_str(s).map_err(|_| CoreError::InvalidBackupId(s.to_string()))?;
        if uuid.get_version_num() != 7 {
            return Err(CoreError::InvalidBackupId(s.to_string()));
        }
        Ok(Self(uuid))
    }
}
