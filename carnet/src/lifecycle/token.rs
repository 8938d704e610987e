use rand::RngCore;

/// Bytes of entropy behind every credential token
pub const TOKEN_BYTES: usize = 32;

/// Source of fresh credential tokens
pub trait TokenSource: Send + Sync {
    fn draw(&self) -> String;
}

/// 32 random bytes from the thread rng, url safe base64 without padding
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn draw(&self) -> String {
        let mut buf = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut buf);
        base64::encode_config(buf, base64::URL_SAFE_NO_PAD)
    }
}
