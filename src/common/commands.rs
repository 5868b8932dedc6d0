/// Send intents supplied by the rendering layer.
#[derive(Debug, Clone)]
pub enum ComposeCommand {
    SendText(String),
    /// Encoded image bytes (PNG or JPEG) as captured or picked by the user.
    SendPhoto(Vec<u8>),
}
