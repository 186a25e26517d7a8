use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

macro_rules! bitset {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$fmeta:meta])* const $flag:ident = $bit:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            pub const NONE: Self = Self(0);
            $( $(#[$fmeta])* pub const $flag: Self = Self($bit); )*

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// True if every flag in `other` is set (always true for `NONE`).
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// True if at least one flag in `other` is set (always false for `NONE`).
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }
        }

        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut names = Vec::new();
                $( if $bit != 0 && self.contains(Self::$flag) { names.push(stringify!($flag)); } )*
                if names.is_empty() {
                    write!(f, "{}(NONE)", stringify!($name))
                } else {
                    write!(f, "{}({})", stringify!($name), names.join(" | "))
                }
            }
        }
    };
}

bitset! {
    /// Capabilities a backend reports for one account.
    pub struct StorageFlags {
        /// Parameter values are stored together with their type.
        const STORES_TYPES = 1;
    }
}

bitset! {
    /// Per-entry flags passed along with a set request.
    pub struct EntryFlags {
        /// The value is a credential and should go to secure storage if possible.
        const SECRET = 1;
        /// The value is discarded when the account reconnects.
        const UNSET_ON_RECONNECT = 2;
    }
}

bitset! {
    /// Restrictions the owning backend places on an account.
    pub struct RestrictionFlags {
        const CANNOT_SET_PARAMETERS = 1;
        const CANNOT_SET_ENABLED = 2;
        const CANNOT_SET_PRESENCE = 4;
        const CANNOT_SET_SERVICE = 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_and_intersects() {
        let flags = RestrictionFlags::CANNOT_SET_ENABLED | RestrictionFlags::CANNOT_SET_SERVICE;
        assert!(flags.contains(RestrictionFlags::CANNOT_SET_ENABLED));
        assert!(!flags.contains(RestrictionFlags::CANNOT_SET_PARAMETERS));
        assert!(flags.contains(RestrictionFlags::NONE));
        assert!(!flags.intersects(RestrictionFlags::NONE));
        assert!(flags.intersects(RestrictionFlags::CANNOT_SET_SERVICE | RestrictionFlags::CANNOT_SET_PRESENCE));
        assert_eq!(flags.bits(), 10);
        assert_eq!(serde_json::to_string(&flags).unwrap(), "10");
    }

    #[test]
    fn test_debug_lists_names() {
        let flags = EntryFlags::SECRET | EntryFlags::UNSET_ON_RECONNECT;
        assert_eq!(format!("{:?}", flags), "EntryFlags(SECRET | UNSET_ON_RECONNECT)");
        assert_eq!(format!("{:?}", StorageFlags::NONE), "StorageFlags(NONE)");
    }
}
