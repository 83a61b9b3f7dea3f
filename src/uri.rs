use url::Url;

use crate::{ErrorKind, Result};

/// Parses `input` as an absolute `http` or `https` URL with a host.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidUrl`] if `input` is not a URL at all and
/// [`ErrorKind::UnsupportedScheme`] if it cannot be fetched over HTTP.
pub fn parse_url(input: &str) -> Result<Url> {
    let url = Url::parse(input).map_err(|e| ErrorKind::InvalidUrl(input.to_string(), e))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(ErrorKind::UnsupportedScheme(input.to_string())),
    }
}

/// Validates a whole batch up front, before any request goes out.
///
/// # Errors
///
/// Fails with [`ErrorKind::EmptyBatch`] when there are no URLs, or with the
/// error of the first URL that does not pass [`parse_url`].
pub fn parse_urls<I, S>(inputs: I) -> Result<Vec<Url>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let urls = inputs
        .into_iter()
        .map(|input| parse_url(input.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    if urls.is_empty() {
        return Err(ErrorKind::EmptyBatch);
    }
    Ok(urls)
}
