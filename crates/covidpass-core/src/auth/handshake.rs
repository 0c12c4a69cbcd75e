//! Touchstone federated login.
//!
//! The authorize URL bounces through the Atlas OAuth server and the
//! Touchstone identity provider. The client follows each redirect by hand
//! (the cookie jar keeps the IdP session, TLS presents the certificate) and
//! submits the auto-posting SAML forms the IdP serves in between. The chain
//! ends at the portal's redirect URI with the access token in the fragment.

use std::sync::OnceLock;

use chrono::Duration;
use regex::Regex;
use reqwest::{header, Client, StatusCode, Url};
use tracing::{debug, info};

use super::store::SessionData;
use crate::api::{ApiError, Result};

/// Upper bound on redirects plus form posts before giving up.
const MAX_HANDSHAKE_HOPS: usize = 20;

/// Token lifetime assumed when the redirect omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Next request the handshake has to issue.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Get(Url),
    Post(Url, Vec<(String, String)>),
}

impl Step {
    fn url(&self) -> &Url {
        match self {
            Step::Get(url) | Step::Post(url, _) => url,
        }
    }
}

/// A form found on an intermediate IdP page.
#[derive(Debug, Clone, PartialEq)]
struct HtmlForm {
    action: String,
    method_post: bool,
    fields: Vec<(String, String)>,
}

/// Run the handshake and return the freshly issued token.
pub(crate) async fn login(
    client: &Client,
    authorize_url: &str,
    redirect_uri: &str,
) -> Result<SessionData> {
    let start = Url::parse(authorize_url)
        .map_err(|e| ApiError::Authentication(format!("invalid authorize URL: {e}")))?;
    let target = Url::parse(redirect_uri)
        .map_err(|e| ApiError::Authentication(format!("invalid redirect URI: {e}")))?;
    let mut step = Step::Get(start);

    for hop in 0..MAX_HANDSHAKE_HOPS {
        let url = step.url().clone();
        debug!(hop, url = %url, "Handshake request");

        let request = match step {
            Step::Get(url) => client.get(url),
            Step::Post(url, fields) => client.post(url).form(&fields),
        };
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::connectivity(url.as_str(), e))?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    ApiError::Authentication(format!("{status} from {url} without a Location"))
                })?;
            let next = url.join(location).map_err(|e| {
                ApiError::Authentication(format!("bad redirect target {location:?}: {e}"))
            })?;

            if is_redirect_target(&next, &target) {
                let data = token_from_redirect(&next)?;
                info!(expires_at = %data.expires_at, "Touchstone login complete");
                return Ok(data);
            }
            step = Step::Get(next);
            continue;
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ApiError::Authentication(format!(
                    "{url} rejected the client certificate ({status})"
                )));
            }
            s if !s.is_success() => {
                return Err(ApiError::Authentication(format!(
                    "unexpected {status} from {url} during login"
                )));
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::connectivity(url.as_str(), e))?;
        let form = pick_form(&parse_forms(&body)).ok_or_else(|| {
            ApiError::Authentication(format!(
                "login stopped at {url} without reaching {redirect_uri}"
            ))
        })?;
        let action = url.join(&form.action).map_err(|e| {
            ApiError::Authentication(format!("bad form action {:?}: {e}", form.action))
        })?;

        step = if form.method_post {
            Step::Post(action, form.fields)
        } else {
            let mut action = action;
            action
                .query_pairs_mut()
                .extend_pairs(form.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            Step::Get(action)
        };
    }

    Err(ApiError::Authentication(format!(
        "gave up after {MAX_HANDSHAKE_HOPS} redirects"
    )))
}

/// Whether `url` points at the portal's redirect URI: same origin, and a
/// path at or below the configured one.
fn is_redirect_target(url: &Url, target: &Url) -> bool {
    let base = target.path().trim_end_matches('/');
    url.scheme() == target.scheme()
        && url.host_str() == target.host_str()
        && url.port_or_known_default() == target.port_or_known_default()
        && url
            .path()
            .strip_prefix(base)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Extract the token from the `#access_token=...` fragment of the final redirect.
fn token_from_redirect(url: &Url) -> Result<SessionData> {
    // The fragment uses query-string encoding; decode it the same way.
    let mut params: Vec<(String, String)> = Vec::new();
    if let Some(fragment) = url.fragment() {
        let mut carrier = url.clone();
        carrier.set_fragment(None);
        carrier.set_query(Some(fragment));
        params.extend(carrier.query_pairs().into_owned());
    }
    params.extend(url.query_pairs().into_owned());
    let lookup = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    if let Some(error) = lookup("error") {
        let description = lookup("error_description").unwrap_or_default();
        return Err(ApiError::Authentication(format!(
            "identity provider returned {error}: {description}"
        )));
    }

    let access_token = lookup("access_token").filter(|t| !t.is_empty()).ok_or_else(|| {
        ApiError::Authentication(format!(
            "redirect to {} carried no access token",
            url.host_str().unwrap_or_default()
        ))
    })?;
    let token_type = lookup("token_type").unwrap_or("Bearer");

    let secs = match lookup("expires_in") {
        None => DEFAULT_TOKEN_LIFETIME_SECS,
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs >= 0)
            .ok_or_else(|| ApiError::Authentication(format!("invalid expires_in {raw:?}")))?,
    };
    let out_of_range =
        || ApiError::Authentication(format!("token lifetime of {secs}s is out of range"));
    let lifetime = Duration::try_seconds(secs).ok_or_else(out_of_range)?;

    SessionData::new(access_token.to_string(), token_type.to_string(), lifetime)
        .ok_or_else(out_of_range)
}

fn form_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<form\b([^>]*)>(.*?)</form>").expect("valid form regex"))
}

fn input_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<input\b([^>]*)>").expect("valid input regex"))
}

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)\b([a-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid attr regex")
    })
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    attr_regex()
        .captures_iter(tag)
        .find(|c| c[1].eq_ignore_ascii_case(name))
        .and_then(|c| c.get(2).or_else(|| c.get(3)).or_else(|| c.get(4)))
        .map(|m| unescape_html(m.as_str()))
}

fn parse_forms(html: &str) -> Vec<HtmlForm> {
    form_regex()
        .captures_iter(html)
        .map(|form| {
            let attrs = &form[1];
            let fields = input_regex()
                .captures_iter(&form[2])
                .filter_map(|input| {
                    let name = attribute(&input[1], "name")?;
                    let value = attribute(&input[1], "value").unwrap_or_default();
                    Some((name, value))
                })
                .collect();
            HtmlForm {
                action: attribute(attrs, "action").unwrap_or_default(),
                method_post: attribute(attrs, "method")
                    .map(|m| m.eq_ignore_ascii_case("post"))
                    .unwrap_or(false),
                fields,
            }
        })
        .collect()
}

/// Choose the form that moves the login forward: a SAML relay form, then
/// the certificate login form, then a lone form.
fn pick_form(forms: &[HtmlForm]) -> Option<HtmlForm> {
    let is_saml = |f: &&HtmlForm| {
        f.fields
            .iter()
            .any(|(name, _)| name == "SAMLResponse" || name == "SAMLRequest")
    };
    let is_certificate = |f: &&HtmlForm| f.action.to_ascii_lowercase().contains("certificate");

    forms
        .iter()
        .find(is_saml)
        .or_else(|| forms.iter().find(is_certificate))
        .or_else(|| if forms.len() == 1 { forms.first() } else { None })
        .cloned()
}

fn unescape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let Some(end) = rest.find(';') else { break };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
