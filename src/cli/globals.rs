use secrecy::SecretString;

/// Process-wide secrets resolved at startup and shared with the server.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub jwt_secret: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self { jwt_secret }
    }
}
