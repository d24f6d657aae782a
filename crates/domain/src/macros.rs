//! Wire-name conversions for fieldless enums
//!
//! Connection states and realtime message kinds travel as lowercase strings.
//! [`impl_wire_names!`](crate::impl_wire_names) maps each variant to its
//! wire name once and derives `as_str`, `Display` and `FromStr` from that
//! table.
//!
//! ```rust
//! use rentline_domain::impl_wire_names;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum LeaseStatus {
//!     Draft,
//!     Active,
//! }
//!
//! impl_wire_names!(LeaseStatus {
//!     Draft => "draft",
//!     Active => "active",
//! });
//!
//! assert_eq!(LeaseStatus::Active.as_str(), "active");
//! assert_eq!("DRAFT".parse::<LeaseStatus>(), Ok(LeaseStatus::Draft));
//! ```

/// Derive `as_str`, `Display` and case-insensitive `FromStr` from a
/// variant-to-name table. Parse errors name the enum and the rejected input.
#[macro_export]
macro_rules! impl_wire_names {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// Wire name of this variant.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ::std::string::String;

            fn from_str(input: &str) -> ::std::result::Result<Self, Self::Err> {
                $(
                    if input.eq_ignore_ascii_case($wire) {
                        return ::std::result::Result::Ok(Self::$variant);
                    }
                )+
                ::std::result::Result::Err(::std::format!("Invalid {}: {}", stringify!($name), input))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Occupancy {
        Vacant,
        Occupied,
        Reserved,
    }

    impl_wire_names!(Occupancy {
        Vacant => "vacant",
        Occupied => "occupied",
        Reserved => "reserved",
    });

    #[test]
    fn test_display_uses_wire_name() {
        assert_eq!(Occupancy::Vacant.to_string(), "vacant");
        assert_eq!(Occupancy::Reserved.as_str(), "reserved");
    }

    #[test]
    fn test_parse_ignores_case() {
        assert_eq!("OCCUPIED".parse::<Occupancy>(), Ok(Occupancy::Occupied));
        assert_eq!("Vacant".parse::<Occupancy>(), Ok(Occupancy::Vacant));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "demolished".parse::<Occupancy>().unwrap_err();
        assert_eq!(err, "Invalid Occupancy: demolished");
        assert!("".parse::<Occupancy>().is_err());
    }
}
