//! Loopback endpoint the provider redirects the browser to after consent.
//!
//! Requests that do not belong to the pending authorization (a favicon fetch,
//! a stale tab with another `state`) get a 400 and the listener keeps waiting.

use std::convert::Infallible;
use std::time::Duration;
use anyhow::Context;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use oauth2::{AuthorizationCode, CsrfToken, RedirectUrl};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const DONE_HTML: &str =
    "<html><body><p>Authorization complete. You can close this window.</p></body></html>";
const DENIED_HTML: &str =
    "<html><body><p>Authorization was not granted. You can close this window.</p></body></html>";

/// Code on consent, provider error code on refusal
type Answer = Result<String, String>;

/// What one redirect request carried.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Callback {
    Code(String),
    /// The provider reported an error such as `access_denied`.
    Denied(String),
    Ignored(&'static str),
}

pub(crate) fn parse_callback(query: Option<&str>, expected_state: &str) -> Callback {
    let mut state = None;
    let mut code = None;
    let mut error = None;
    for (key, value) in form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
        match &*key {
            "state" => state = Some(value.into_owned()),
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Callback::Ignored("state does not match this authorization request");
    }
    match (code, error) {
        (_, Some(error)) => Callback::Denied(error),
        (Some(code), None) => Callback::Code(code),
        (None, None) => Callback::Ignored("no authorization code in redirect"),
    }
}

fn respond(callback: Callback, answers: &mpsc::Sender<Answer>) -> Response<Full<Bytes>> {
    let (status, body, answer) = match callback {
        Callback::Code(code) => (StatusCode::OK, DONE_HTML, Some(Ok(code))),
        Callback::Denied(error) => (StatusCode::OK, DENIED_HTML, Some(Err(error))),
        Callback::Ignored(reason) => (StatusCode::BAD_REQUEST, reason, None),
    };
    if let Some(answer) = answer {
        // first answer wins
        let _ = answers.try_send(answer);
    }

    let mut response = Response::new(Full::from(body));
    *response.status_mut() = status;
    response
}

pub(crate) struct RedirectListener {
    listener: TcpListener,
    url: RedirectUrl,
}

impl RedirectListener {
    /// Listen on an ephemeral loopback port.
    pub(crate) async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind loopback redirect listener")?;
        let addr = listener.local_addr().context("read redirect listener address")?;
        let url = RedirectUrl::new(format!("http://{addr}")).context("construct redirect url")?;
        Ok(Self { listener, url })
    }

    pub(crate) fn url(&self) -> &RedirectUrl {
        &self.url
    }

    /// Serve redirects until one answers the request identified by `csrf`,
    /// giving up after `timeout`.
    pub(crate) async fn receive_code(
        self,
        csrf: &CsrfToken,
        timeout: Duration,
    ) -> anyhow::Result<AuthorizationCode> {
        let (answer_tx, mut answer_rx) = mpsc::channel(1);

        let answer = tokio::time::timeout(timeout, async {
            tokio::select! {
                served = self.serve(csrf.secret().clone(), answer_tx) => match served {
                    Err(err) => Err(err),
                    Ok(never) => match never {},
                },
                answer = answer_rx.recv() => match answer {
                    Some(Ok(code)) => Ok(code),
                    Some(Err(error)) => Err(anyhow::anyhow!("authorization denied: {error}")),
                    None => Err(anyhow::anyhow!("redirect listener stopped")),
                },
            }
        })
        .await
        .context("timed out waiting for the user to authorize")??;

        Ok(AuthorizationCode::new(answer))
    }

    async fn serve(
        &self,
        expected_state: String,
        answers: mpsc::Sender<Answer>,
    ) -> anyhow::Result<Infallible> {
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .context("accept redirect connection")?;
            tracing::debug!(%peer, "redirect connection");

            let expected_state = expected_state.clone();
            let answers = answers.clone();
            let service = service_fn(move |req: Request<Incoming>| {
                let response = respond(parse_callback(req.uri().query(), &expected_state), &answers);
                async move { Ok::<_, Infallible>(response) }
            });

            tokio::spawn(async move {
                if let Err(err) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    tracing::debug!(error = %err, "redirect connection failed");
                }
            });
        }
    }
}
