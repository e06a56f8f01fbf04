use ppu_proc_macros::{ConfigDisplay, EnumDisplay};
use test_log::test;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumDisplay)]
enum FillMode {
    Backdrop,
    SolidBlack,
}

#[derive(Debug, Clone, Copy, ConfigDisplay)]
struct Limits {
    sprites: u8,
    tiles: u8,
}

#[derive(Debug, Clone, Copy, ConfigDisplay)]
struct Config {
    #[cfg_display(indent_nested)]
    limits: Limits,
    fill: FillMode,
    #[cfg_display(debug_fmt)]
    scale: Option<u8>,
    #[cfg_display(skip)]
    #[allow(dead_code)]
    hidden: bool,
}

#[test]
fn enum_display_prints_variant_name() {
    assert_eq!("Backdrop", FillMode::Backdrop.to_string());
    assert_eq!("SolidBlack", FillMode::SolidBlack.to_str());
}

#[test]
fn config_display_nests_and_skips() {
    let config = Config {
        limits: Limits { sprites: 32, tiles: 34 },
        fill: FillMode::SolidBlack,
        scale: Some(2),
        hidden: true,
    };

    let expected = concat!(
        "\n",
        "  limits: \n",
        "    sprites: 32\n",
        "    tiles: 34\n",
        "  fill: SolidBlack\n",
        "  scale: Some(2)",
    );
    assert_eq!(expected, config.to_string());
}
