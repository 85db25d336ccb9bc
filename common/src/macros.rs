#[macro_export]
macro_rules! agg_mod {
    [ $( $name:ident $(,)? )+ ] => {
        $(
            pub mod $name;
        )+
    };
}

/// Wire names are the lower-case / kebab-case strings stored in the database
/// and sent over JSON, so each variant names its text explicitly.
#[macro_export]
macro_rules! impl_from_str_for_enum {
    ($enum_name:ident, $( $variant:ident => $text:literal ),* $(,)?) => {
        impl std::str::FromStr for $enum_name {
            type Err = $crate::error::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($enum_name::$variant),)*
                    _ => Err($crate::error::ParseEnumError {
                        kind: stringify!($enum_name),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

#[macro_export]
macro_rules! impl_display_for_enum {
    ($enum_name:ident, $( $variant:ident => $text:literal ),* $(,)?) => {
        impl $enum_name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $enum_name::$variant => $text, )*
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
