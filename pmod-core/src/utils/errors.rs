//! Bit-set argument errors.
//!
//! Drivers validate every argument of a call before touching the bus and report
//! all violations at once. Each violation is one flag; flags combine with `|`.

/// Declare a `Copy` bit-set type whose associated constants name invalid-argument
/// conditions.
///
/// ```
/// pmod_core::arg_flags! {
///     pub struct Flags: u8 {
///         const A = 1 << 0;
///         const B = 1 << 1;
///     }
/// }
/// let f = Flags::A | Flags::B;
/// assert!(f.contains(Flags::A));
/// assert_eq!(f.bits(), 0b11);
/// ```
#[macro_export]
macro_rules! arg_flags {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident: $repr:ty {
            $(
                $(#[$fmeta:meta])*
                const $flag:ident = $bit:expr;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Default)]
        $vis struct $name($repr);

        impl $name {
            $(
                $(#[$fmeta])*
                pub const $flag: Self = Self($bit);
            )*

            /// No flag set.
            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn bits(&self) -> $repr {
                self.0
            }

            pub const fn is_empty(&self) -> bool {
                self.0 == 0
            }

            /// True if every flag of `other` is also set in `self`.
            pub const fn contains(&self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Set `flag` when `violated` holds.
            pub fn set(&mut self, violated: bool, flag: Self) {
                if violated {
                    self.0 |= flag.0;
                }
            }

            /// `Ok(())` when no flag is set, otherwise the set itself as the error.
            pub fn into_result(self) -> Result<(), Self> {
                if self.is_empty() { Ok(()) } else { Err(self) }
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl core::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                let mut set = f.debug_set();
                $(
                    if self.contains(Self::$flag) {
                        set.entry(&format_args!("{}", stringify!($flag)));
                    }
                )*
                set.finish()
            }
        }
    };
}
