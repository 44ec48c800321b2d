use crate::signature;
use crate::types::{OAuthClientApp, OAuthUser, SecretString};
use rand::Rng;
use rand::distr::Alphanumeric;
use std::time::{SystemTime, UNIX_EPOCH};
use tophe_http::{ConfigError, RequestSigner, SignableRequest};

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";
const NONCE_LEN: usize = 32;

/// Where the protocol parameters are placed on the signed request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignatureLocation {
    /// `Authorization: OAuth ...` header
    #[default]
    Header,
    /// Appended to the query string
    Query,
}

/// Signs requests with OAuth 1.0a HMAC-SHA1.
///
/// The signature covers the method, the normalized URL, its query
/// parameters, the parameters of a form-encoded body and the protocol
/// parameters. Without a user token the request is signed with the consumer
/// credentials alone (two-legged).
///
/// # Example
///
/// ```ignore
/// let app = OAuthClientApp::new("consumer-key", "consumer-secret");
/// let user = OAuthUser::new("token", "token-secret");
/// let signer = Arc::new(OAuth1Signer::new(app, Some(user)));
///
/// let request = Request::builder()
///     .url("https://api.example.com/statuses/home")?
///     .signer(signer)
///     .parser(parsers::json_value())
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct OAuth1Signer {
    app: OAuthClientApp,
    user: Option<OAuthUser>,
    location: SignatureLocation,
    realm: Option<String>,
}

impl OAuth1Signer {
    #[must_use]
    pub fn new(app: OAuthClientApp, user: Option<OAuthUser>) -> Self {
        Self {
            app,
            user,
            location: SignatureLocation::default(),
            realm: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: SignatureLocation) -> Self {
        self.location = location;
        self
    }

    /// `realm` reported in the `Authorization` header. Not signed.
    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    #[must_use]
    pub fn app(&self) -> &OAuthClientApp {
        &self.app
    }

    #[must_use]
    pub fn user(&self) -> Option<&OAuthUser> {
        self.user.as_ref()
    }

    fn token(&self) -> Option<&str> {
        self.user.as_ref().and_then(OAuthUser::token)
    }

    fn token_secret(&self) -> &str {
        self.user
            .as_ref()
            .and_then(OAuthUser::token_secret)
            .map_or("", SecretString::expose)
    }

    fn protocol_params(&self, nonce: &str, timestamp: u64) -> Vec<(String, String)> {
        let mut params = vec![
            (
                "oauth_consumer_key".to_owned(),
                self.app.consumer_key().to_owned(),
            ),
            ("oauth_nonce".to_owned(), nonce.to_owned()),
            (
                "oauth_signature_method".to_owned(),
                SIGNATURE_METHOD.to_owned(),
            ),
            ("oauth_timestamp".to_owned(), timestamp.to_string()),
            ("oauth_version".to_owned(), OAUTH_VERSION.to_owned()),
        ];
        if let Some(token) = self.token() {
            params.push(("oauth_token".to_owned(), token.to_owned()));
        }
        params
    }

    /// Sign with a fixed nonce and timestamp.
    pub(crate) fn sign_with(
        &self,
        request: &mut SignableRequest<'_>,
        nonce: &str,
        timestamp: u64,
    ) -> Result<(), ConfigError> {
        let mut oauth = self.protocol_params(nonce, timestamp);

        let mut signed: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if let Some(form) = request.form_params() {
            signed.extend_from_slice(form);
        }
        signed.extend_from_slice(&oauth);

        let base = signature::base_string(request.method(), request.url(), &signed);
        let sig = signature::hmac_sha1(
            &base,
            self.app.consumer_secret().expose(),
            self.token_secret(),
        )
        .map_err(|e| ConfigError::Signing(e.to_string()))?;
        oauth.push(("oauth_signature".to_owned(), sig));

        tracing::trace!(
            method = %request.method(),
            two_legged = self.token().is_none(),
            "request signed with OAuth1"
        );

        match self.location {
            SignatureLocation::Header => {
                let header = self.authorization_header(&oauth);
                request.headers_mut().set_header("authorization", header);
            }
            SignatureLocation::Query => {
                request
                    .url_mut()
                    .query_pairs_mut()
                    .extend_pairs(oauth.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            }
        }
        Ok(())
    }

    fn authorization_header(&self, oauth: &[(String, String)]) -> String {
        let mut fields = Vec::with_capacity(oauth.len() + 1);
        if let Some(realm) = &self.realm {
            fields.push(format!("realm=\"{}\"", signature::encode(realm)));
        }
        fields.extend(
            oauth
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", signature::encode(k), signature::encode(v))),
        );
        format!("OAuth {}", fields.join(", "))
    }
}

fn nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

impl RequestSigner for OAuth1Signer {
    fn sign(&self, request: &mut SignableRequest<'_>) -> Result<(), ConfigError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ConfigError::Signing(format!("system clock before Unix epoch: {e}")))?
            .as_secs();
        self.sign_with(request, &nonce(), timestamp)
    }

    fn identity(&self) -> Option<String> {
        Some(match self.token() {
            Some(_) => format!("oauth1:{}+user", self.app.consumer_key()),
            None => format!("oauth1:{}", self.app.consumer_key()),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::Method;
    use std::sync::Arc;
    use tophe_http::{HeaderStore, HttpClientBuilder, HttpClientConfig, Request, parsers};
    use url::Url;

    fn reference_signer() -> OAuth1Signer {
        OAuth1Signer::new(
            OAuthClientApp::new("dpf43f3p2l4k3l03", "kd94hf93k423kf44"),
            Some(OAuthUser::new("nnch734d00sl2jdk", "pfkkdhi9sl3r4s00")),
        )
    }

    fn sign(
        signer: &OAuth1Signer,
        method: &Method,
        url: &mut Url,
        form: Option<&[(String, String)]>,
    ) -> HeaderStore {
        let mut headers = HeaderStore::new();
        let mut request = SignableRequest::new(method, url, &mut headers, form);
        signer
            .sign_with(&mut request, "kllo9940pd9333jh", 1_191_242_096)
            .unwrap();
        headers
    }

    #[test]
    fn test_reference_authorization_header() {
        let mut url =
            Url::parse("http://photos.example.net/photos?file=vacation.jpg&size=original")
                .unwrap();
        let headers = sign(&reference_signer(), &Method::GET, &mut url, None);

        let auth = headers.header("authorization").unwrap();
        assert!(auth.starts_with("OAuth "));
        assert!(auth.contains(r#"oauth_consumer_key="dpf43f3p2l4k3l03""#));
        assert!(auth.contains(r#"oauth_token="nnch734d00sl2jdk""#));
        assert!(auth.contains(r#"oauth_signature="tR3%2BTy81lMeYAr%2FFid0kMTYa%2FWM%3D""#));
        assert_eq!(
            url.as_str(),
            "http://photos.example.net/photos?file=vacation.jpg&size=original"
        );
    }

    #[test]
    fn test_query_location() {
        let mut url =
            Url::parse("http://photos.example.net/photos?file=vacation.jpg&size=original")
                .unwrap();
        let signer = reference_signer().with_location(SignatureLocation::Query);
        let headers = sign(&signer, &Method::GET, &mut url, None);

        assert!(headers.header("authorization").is_none());
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("file".to_owned(), "vacation.jpg".to_owned())));
        assert!(query.contains(&(
            "oauth_signature".to_owned(),
            "tR3+Ty81lMeYAr/Fid0kMTYa/WM=".to_owned()
        )));
    }

    #[test]
    fn test_form_params_are_signed() {
        let form = vec![("status".to_owned(), "hello world".to_owned())];
        let signer = reference_signer();

        let mut url = Url::parse("https://api.example.com/update").unwrap();
        let with_form = sign(&signer, &Method::POST, &mut url, Some(&form));
        let mut url = Url::parse("https://api.example.com/update").unwrap();
        let without_form = sign(&signer, &Method::POST, &mut url, None);

        assert_ne!(
            with_form.header("authorization"),
            without_form.header("authorization")
        );

        let mut params = form;
        params.extend(signer.protocol_params("kllo9940pd9333jh", 1_191_242_096));
        let base = signature::base_string(&Method::POST, &url, &params);
        let expected = signature::hmac_sha1(&base, "kd94hf93k423kf44", "pfkkdhi9sl3r4s00").unwrap();
        assert!(
            with_form
                .header("authorization")
                .unwrap()
                .contains(&format!("oauth_signature=\"{}\"", signature::encode(&expected)))
        );
    }

    #[test]
    fn test_two_legged_without_user() {
        let signer = OAuth1Signer::new(OAuthClientApp::new("consumer-key", "secret"), None);
        let mut url = Url::parse("http://www.example.com/?msg=signed%20message").unwrap();
        let headers = sign(&signer, &Method::GET, &mut url, None);

        let auth = headers.header("authorization").unwrap();
        assert!(!auth.contains("oauth_token"));
        assert_eq!(signer.identity().as_deref(), Some("oauth1:consumer-key"));
    }

    #[test]
    fn test_empty_user_degrades_to_two_legged() {
        let user = OAuthUser::from_parts(None, None);
        let signer = OAuth1Signer::new(OAuthClientApp::new("consumer-key", "secret"), Some(user));
        let mut url = Url::parse("http://www.example.com/").unwrap();
        let headers = sign(&signer, &Method::GET, &mut url, None);

        assert!(!headers.header("authorization").unwrap().contains("oauth_token"));
        assert_eq!(signer.identity().as_deref(), Some("oauth1:consumer-key"));

        let user = OAuthUser::from_parts(Some(String::new()), Some(SecretString::new("")));
        let signer = OAuth1Signer::new(OAuthClientApp::new("consumer-key", "secret"), Some(user));
        let mut url = Url::parse("http://www.example.com/").unwrap();
        sign(&signer, &Method::GET, &mut url, None);
    }

    #[test]
    fn test_realm_in_header() {
        let signer = reference_signer().with_realm("http://photos.example.net/");
        let mut url = Url::parse("http://photos.example.net/photos").unwrap();
        let headers = sign(&signer, &Method::GET, &mut url, None);
        assert!(
            headers
                .header("authorization")
                .unwrap()
                .starts_with(r#"OAuth realm="http%3A%2F%2Fphotos.example.net%2F", "#)
        );
    }

    #[test]
    fn test_nonce_is_random_alphanumeric() {
        let a = nonce();
        let b = nonce();
        assert_eq!(a.len(), NONCE_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_with_user() {
        assert_eq!(
            reference_signer().identity().as_deref(),
            Some("oauth1:dpf43f3p2l4k3l03+user")
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let dbg = format!("{:?}", reference_signer());
        assert!(!dbg.contains("kd94hf93k423kf44"));
        assert!(!dbg.contains("pfkkdhi9sl3r4s00"));
    }

    #[tokio::test]
    async fn test_dispatch_with_missing_or_empty_user() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::prelude::GET)
                .path("/")
                .query_param("msg", "signed message")
                .header_exists("authorization");
            then.status(200).body("ok");
        });
        let client = HttpClientBuilder::with_config(HttpClientConfig::for_testing())
            .build()
            .unwrap();

        for user in [None, Some(OAuthUser::from_parts(None, None))] {
            let signer = Arc::new(OAuth1Signer::new(
                OAuthClientApp::new("consumer-key", "secret"),
                user,
            ));
            let request = Request::builder()
                .url_with_params(&server.url("/"), [("msg", "signed message")])
                .unwrap()
                .signer(signer)
                .parser(parsers::string())
                .build()
                .unwrap();
            assert_eq!(client.dispatch(request).await.unwrap(), "ok");
        }

        mock.assert_calls(2);
    }
}
