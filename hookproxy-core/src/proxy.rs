//! The upstream reverse proxy: forwards a (possibly hook-mutated) request to
//! the configured `RemoteEndpoint` and hands back the raw response so the
//! handler can either stream it straight through or capture it for post-hooks.

use hyper::{client::HttpConnector, header::USER_AGENT, Body, Client, Request, Response};
use hyperlocal::{UnixClientExt, UnixConnector, Uri as UnixUri};

use crate::endpoint::Endpoint;

enum Transport {
    Unix(Client<UnixConnector>),
    Tcp(Client<HttpConnector>),
}

/// Reverse proxy bound to a single upstream endpoint.
pub struct UpstreamProxy {
    transport: Transport,
    unix_path: Option<String>,
    tcp_authority: Option<String>,
}

impl UpstreamProxy {
    pub fn new(remote_endpoint: &str) -> Self {
        let endpoint = Endpoint::parse(remote_endpoint)
            .unwrap_or_else(|e| panic!("invalid remoteEndpoint {remote_endpoint:?}: {e}"));
        if endpoint.is_unix() {
            Self {
                transport: Transport::Unix(Client::unix()),
                unix_path: Some(endpoint.addr),
                tcp_authority: None,
            }
        } else if endpoint.is_tcp() {
            Self {
                transport: Transport::Tcp(Client::new()),
                unix_path: None,
                tcp_authority: Some(endpoint.addr),
            }
        } else {
            panic!("unsupported remoteEndpoint scheme {:?}", endpoint.proto);
        }
    }

    /// Forward `req` upstream, rewriting its URI to point at the endpoint
    /// and clearing `User-Agent` if the caller didn't set one.
    pub async fn forward(&self, mut req: Request<Body>) -> Result<Response<Body>, hyper::Error> {
        if !req.headers().contains_key(USER_AGENT) {
            req.headers_mut()
                .insert(USER_AGENT, hyper::header::HeaderValue::from_static(""));
        }

        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| "/".to_owned());

        match &self.transport {
            Transport::Unix(client) => {
                let sock = self.unix_path.as_deref().expect("unix transport has a path");
                let uri: hyper::Uri = UnixUri::new(sock, &path_and_query).into();
                *req.uri_mut() = uri;
                client.request(req).await
            }
            Transport::Tcp(client) => {
                let authority = self
                    .tcp_authority
                    .as_deref()
                    .expect("tcp transport has an authority");
                let uri: hyper::Uri = format!("http://{authority}{path_and_query}")
                    .parse()
                    .expect("authority + path should form a valid URI");
                *req.uri_mut() = uri;
                client.request(req).await
            }
        }
    }
}
