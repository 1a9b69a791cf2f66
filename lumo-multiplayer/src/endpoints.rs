use lumo::{ClientConfig, LumoError, Result};
use url::Url;

fn base(config: &ClientConfig) -> Result<Url> {
    Url::parse(config.base_url()).map_err(|e| {
        LumoError::Config(format!("Invalid API URL {}: {}", config.api_base_url, e))
    })
}

fn append_segments(url: &mut Url, segments: &[&str]) -> Result<()> {
    url.path_segments_mut()
        .map_err(|_| LumoError::Config("API URL cannot be a base".into()))?
        .pop_if_empty()
        .extend(segments);
    Ok(())
}

/// `{base}/multiplayer/sessions/{session_id}`
pub fn session_url(config: &ClientConfig, session_id: &str) -> Result<Url> {
    let mut url = base(config)?;
    append_segments(&mut url, &["multiplayer", "sessions", session_id])?;
    Ok(url)
}

/// Push-channel URL for a session: the API base with its scheme swapped
/// to ws/wss, `ws/multiplayer/{session_id}` appended and the credentials
/// passed as `token` and `tenant` query parameters.
pub fn push_url(config: &ClientConfig, session_id: &str) -> Result<Url> {
    let (token, tenant) = config.require_credentials()?;
    let mut url = base(config)?;

    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(LumoError::Config(format!(
                "Unsupported API scheme for push channel: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| LumoError::Config(format!("Cannot derive {} URL from {}", scheme, url)))?;

    append_segments(&mut url, &["ws", "multiplayer", session_id])?;
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("tenant", tenant);
    Ok(url)
}
