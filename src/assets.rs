use rust_embed::RustEmbed;

/// Files embedded into the binary at build time.
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Assets;
