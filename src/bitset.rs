//! A tiny hand-rolled bitflags-style macro in the `access::Mask` idiom
//! (associated consts + `contains`/`bits`) rather than pulling in the
//! `bitflags` crate for the handful of status-bit sets this crate needs.

macro_rules! bitflags_like_status {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
        pub struct $name($repr);

        impl $name {
            $(pub const $variant: $repr = $value;)*

            pub fn empty() -> Self {
                Self(0)
            }

            pub fn bits(self) -> $repr {
                self.0
            }

            pub fn contains(self, flag: $repr) -> bool {
                self.0 & flag == flag
            }

            pub fn insert(&mut self, flag: $repr) {
                self.0 |= flag;
            }

            pub fn remove(&mut self, flag: $repr) {
                self.0 &= !flag;
            }
        }
    };
}

pub(crate) use bitflags_like_status;
