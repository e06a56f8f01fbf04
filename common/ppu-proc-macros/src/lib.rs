mod config;
mod enums;

use proc_macro::TokenStream;

/// Implement the `std::fmt::Display` trait for the given enum by printing the variant name, and
/// add a `to_str` method that returns the same string. Only supports enums which have only
/// fieldless variants.
///
/// # Panics
///
/// This macro will panic if applied to a struct, a union, or an enum with any variants that have
/// fields.
#[proc_macro_derive(EnumDisplay)]
pub fn enum_display(input: TokenStream) -> TokenStream {
    enums::enum_display(input)
}

/// Implement the `std::fmt::Display` trait for a config struct, printing one `  field: value` line
/// per named field.
///
/// Field attributes:
/// - `#[cfg_display(debug_fmt)]` prints the field using `Debug` instead of `Display`
/// - `#[cfg_display(indent_nested)]` indents the lines of a nested config struct one more level
/// - `#[cfg_display(skip)]` omits the field
///
/// # Panics
///
/// This macro will panic if applied to an enum, a union, or a struct without named fields.
#[proc_macro_derive(ConfigDisplay, attributes(cfg_display))]
pub fn config_display(input: TokenStream) -> TokenStream {
    config::config_display(input)
}
