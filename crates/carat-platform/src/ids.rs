//! Platform identifiers.
//!
//! Chat platforms hand out opaque 64-bit ids for every resource. Each kind
//! gets its own newtype so a role id can never be passed where a channel id
//! is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! platform_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw numeric id.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

platform_id!(
    /// A text channel.
    ChannelId
);
platform_id!(
    /// A channel category (a folder of channels).
    CategoryId
);
platform_id!(
    /// A server role.
    RoleId
);
platform_id!(
    /// A server member or bot account.
    UserId
);

impl RoleId {
    /// Mention markup that pings every holder of the role.
    pub fn mention(self) -> String {
        format!("<@&{}>", self.0)
    }
}

impl UserId {
    /// Mention markup for a single member.
    pub fn mention(self) -> String {
        format!("<@{}>", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions() {
        assert_eq!(RoleId(12).mention(), "<@&12>");
        assert_eq!(UserId(99).mention(), "<@99>");
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&ChannelId(1234)).unwrap();
        assert_eq!(json, "1234");
        let back: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChannelId(1234));
    }
}
