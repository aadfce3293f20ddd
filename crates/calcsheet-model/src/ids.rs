use core::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a node within one sheet.
    NodeId
);
string_id!(
    /// Identifier of a sheet (the unit of locking and versioning).
    SheetId
);
string_id!(
    /// Identifier of an immutable [`crate::VersionSnapshot`].
    VersionId
);

impl NodeId {
    /// Allocate a fresh random node id.
    pub fn generate() -> Self {
        Self(crate::new_uuid().to_string())
    }
}

impl VersionId {
    pub fn generate() -> Self {
        Self(crate::new_uuid().to_string())
    }
}
