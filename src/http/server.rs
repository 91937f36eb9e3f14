//-
// Copyright (c) 2026, The Mockmta Authors
//
// This file is part of Mockmta.
//
// Mockmta is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mockmta is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along
// with Mockmta. If not, see <http://www.gnu.org/licenses/>.

//! The HTTP/JSON inspection API and the embedded browser front-end.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use super::filter_suggestions;
use crate::mime::message::Message;
use crate::smtp::relay;
use crate::smtp::Envelope;
use crate::storage::engine::Engine;
use crate::storage::{BodyVersion, EmailAddress, EmailHeader, Storage};
use crate::support::error::Error;
use crate::support::system_config::{HttpConfig, RelayConfig};

const PAGE_SIZE: usize = 20;

const INDEX_HTML: &str = include_str!("static/index.html");
const STYLE_CSS: &str = include_str!("static/style.css");
const SCRIPT_JS: &str = include_str!("static/script.js");

lazy_static! {
    // src="cid:..." and src='cid:...' references in HTML bodies
    static ref CID_REF: Regex =
        Regex::new(r#"src=["']cid:([^"']+)["']"#).unwrap();
}

pub struct HttpServer {
    config: HttpConfig,
    engine: Arc<Engine>,
    relays: BTreeMap<String, RelayConfig>,
}

#[derive(Serialize)]
struct PaginationResponse {
    current_page: i64,
    is_first_page: bool,
    is_last_page: bool,
    total_pages: usize,
    total_matches: usize,
}

#[derive(Serialize)]
struct SearchEmailsResponse {
    emails: Vec<EmailHeader>,
    pagination: PaginationResponse,
}

#[derive(Serialize)]
struct RelayData {
    relay_names: Vec<String>,
    sender: EmailAddress,
    recipients: Vec<EmailAddress>,
}

#[derive(Deserialize)]
struct RelayMessageRequest {
    relay_name: String,
    sender: String,
    recipients: Vec<String>,
}

impl HttpServer {
    pub fn new(
        config: HttpConfig,
        relays: BTreeMap<String, RelayConfig>,
        engine: Arc<Engine>,
    ) -> Arc<Self> {
        Arc::new(HttpServer {
            config,
            engine,
            relays,
        })
    }

    pub async fn run(self: Arc<Self>) -> Result<(), Error> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        log::info!("starting http server on {}", self.config.addr);
        self.serve(listener).await
    }

    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
    ) -> Result<(), Error> {
        loop {
            let (socket, remote_addr) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let server = Arc::clone(&server);
                    async move {
                        Ok::<_, Infallible>(server.handle(req).await)
                    }
                });
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(socket), service)
                    .await
                {
                    log::debug!("http connection {}: {}", remote_addr, e);
                }
            });
        }
    }

    async fn handle(
        &self,
        req: Request<Incoming>,
    ) -> Response<Full<Bytes>> {
        let (head, body) = req.into_parts();
        let method = head.method;
        let path = head.uri.path().to_owned();
        let params = parse_query_params(head.uri.query());

        let request_body = if method == Method::POST {
            match body.collect().await {
                Ok(collected) => collected.to_bytes().to_vec(),
                Err(e) => {
                    return plain_response(
                        StatusCode::BAD_REQUEST,
                        &format!("cannot read request body: {}", e),
                    )
                },
            }
        } else {
            Vec::new()
        };

        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(percent_decode)
            .collect();
        let parts: Vec<&str> =
            segments.iter().map(|s| s.as_str()).collect();

        log::debug!("{} {}", method, path);

        if parts.first() == Some(&"api") {
            match self
                .handle_api(&method, &parts[1..], &params, &request_body)
                .await
            {
                Ok(response) => response,
                Err(e) => error_response(&e),
            }
        } else {
            serve_static(&path)
        }
    }

    async fn handle_api(
        &self,
        method: &Method,
        parts: &[&str],
        params: &HashMap<String, String>,
        request_body: &[u8],
    ) -> Result<Response<Full<Bytes>>, Error> {
        match (method, parts) {
            (&Method::GET, ["mailboxes"]) => {
                let mailboxes = self.engine.get_mailboxes()?;
                Ok(json_response(&mailboxes))
            },

            (&Method::GET, ["emails"]) => self.search_emails(params),
            (&Method::DELETE, ["emails"]) => {
                self.engine.delete_all_emails()?;
                Ok(empty_response(StatusCode::NO_CONTENT))
            },

            (&Method::GET, ["emails", email_id]) => {
                let header = self.engine.get_email_by_id(email_id)?;
                Ok(json_response(&header))
            },
            (&Method::DELETE, ["emails", email_id]) => {
                self.engine.delete_email_by_id(email_id)?;
                Ok(empty_response(StatusCode::NO_CONTENT))
            },

            (&Method::GET, ["emails", email_id, "body", version]) => {
                self.get_body(email_id, version)
            },

            (&Method::GET, ["emails", email_id, "attachments"]) => {
                let attachments = self.engine.get_attachments(email_id)?;
                Ok(json_response(&attachments))
            },
            (
                &Method::GET,
                ["emails", email_id, "attachments", attachment_id, "content"],
            ) => self.get_attachment_content(email_id, attachment_id),

            (&Method::GET, ["emails", email_id, "cid", cid]) => {
                self.get_part_by_cid(email_id, cid)
            },

            (&Method::GET, ["emails", email_id, "relay"]) => {
                self.get_relay_data(email_id)
            },
            (&Method::POST, ["emails", email_id, "relay"]) => {
                self.relay_message(email_id, request_body).await
            },

            (&Method::GET, ["filters", "suggestions"]) => {
                let body = filter_suggestions::suggestions_json(
                    params.get("term").map(|s| s.as_str()),
                );
                Ok(bytes_response(
                    StatusCode::OK,
                    "application/json",
                    body,
                ))
            },

            _ => Ok(plain_response(
                StatusCode::NOT_FOUND,
                &format!("Not Found: /api/{}", parts.join("/")),
            )),
        }
    }

    fn search_emails(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<Response<Full<Bytes>>, Error> {
        let query = params.get("query").map(|s| s.as_str()).unwrap_or("");
        let page = match params.get("page") {
            None => 1,
            Some(raw) => match raw.parse::<i64>() {
                Ok(page) if page >= 1 => page,
                _ => return Err(Error::BadPageNumber(raw.clone())),
            },
        };

        if query.is_empty() {
            log::debug!("getting all emails");
        } else {
            log::debug!("searching emails with query {:?}", query);
        }

        let (emails, total_matches) =
            self.engine
                .search_emails(query, page, PAGE_SIZE as i64)?;

        Ok(json_response(&SearchEmailsResponse {
            emails,
            pagination: PaginationResponse {
                current_page: page,
                is_first_page: page == 1,
                is_last_page: page as usize * PAGE_SIZE >= total_matches,
                total_pages: (total_matches + PAGE_SIZE - 1) / PAGE_SIZE,
                total_matches,
            },
        }))
    }

    fn get_body(
        &self,
        email_id: &str,
        version: &str,
    ) -> Result<Response<Full<Bytes>>, Error> {
        let version: BodyVersion = version.parse()?;
        let mut body = self.engine.get_body_version(email_id, version)?;

        // Rewrite inline cid: references to their API endpoints
        if version == BodyVersion::Html || version == BodyVersion::WatchHtml
        {
            body = rewrite_cid_references(&body, email_id);
        }

        Ok(json_response(&body))
    }

    fn get_attachment_content(
        &self,
        email_id: &str,
        attachment_id: &str,
    ) -> Result<Response<Full<Bytes>>, Error> {
        let attachment =
            self.engine.get_attachment(email_id, attachment_id)?;

        let mut response = bytes_response(
            StatusCode::OK,
            &attachment.header.content_type,
            attachment.data,
        );
        if let Ok(value) = HeaderValue::from_str(&format!(
            "attachment; filename={}",
            attachment.header.filename
        )) {
            response.headers_mut().insert(CONTENT_DISPOSITION, value);
        }
        Ok(response)
    }

    fn get_part_by_cid(
        &self,
        email_id: &str,
        cid: &str,
    ) -> Result<Response<Full<Bytes>>, Error> {
        let raw = self
            .engine
            .get_body_version(email_id, BodyVersion::Raw)?;
        let message = Message::parse(raw.as_bytes())?;
        let part = message
            .part_by_cid(cid)
            .ok_or_else(|| Error::NxPart(cid.to_owned()))?;

        let content_type = part
            .headers()
            .get("Content-Type")
            .unwrap_or("application/octet-stream")
            .to_owned();
        Ok(bytes_response(
            StatusCode::OK,
            &content_type,
            part.decoded_body().into_owned(),
        ))
    }

    fn get_relay_data(
        &self,
        email_id: &str,
    ) -> Result<Response<Full<Bytes>>, Error> {
        let header = self.engine.get_email_by_id(email_id)?;
        let mut recipients = header.tos;
        recipients.extend(header.ccs);

        Ok(json_response(&RelayData {
            relay_names: self
                .relays
                .iter()
                .filter(|(_, relay)| relay.enabled)
                .map(|(name, _)| name.clone())
                .collect(),
            sender: header.from,
            recipients,
        }))
    }

    async fn relay_message(
        &self,
        email_id: &str,
        request_body: &[u8],
    ) -> Result<Response<Full<Bytes>>, Error> {
        let request: RelayMessageRequest =
            serde_json::from_slice(request_body)
                .map_err(|e| Error::BadRequestBody(e.to_string()))?;

        let relay_config = self
            .relays
            .get(&request.relay_name)
            .filter(|relay| relay.enabled)
            .ok_or_else(|| Error::NxRelay(request.relay_name.clone()))?;

        let raw = self
            .engine
            .get_body_version(email_id, BodyVersion::Raw)?;
        let envelope = Envelope {
            sender: request.sender,
            recipients: request.recipients,
            data: raw.into_bytes(),
        };

        log::info!("relaying message to {}", relay_config.addr);
        relay::relay_message(relay_config, email_id, &envelope).await?;
        Ok(empty_response(StatusCode::OK))
    }
}

pub(crate) fn rewrite_cid_references(body: &str, email_id: &str) -> String {
    let replacement =
        format!("src=\"/api/emails/{}/cid/$1\"", email_id);
    CID_REF.replace_all(body, replacement.as_str()).into_owned()
}

fn json_response<T: Serialize>(data: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(data) {
        Ok(body) => {
            bytes_response(StatusCode::OK, "application/json", body)
        },
        Err(e) => plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("cannot encode JSON: {}", e),
        ),
    }
}

fn bytes_response(
    status: StatusCode,
    content_type: &str,
    body: Vec<u8>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_str(content_type).unwrap_or_else(|_| {
            HeaderValue::from_static("application/octet-stream")
        }),
    );
    response
}

fn plain_response(status: StatusCode, text: &str) -> Response<Full<Bytes>> {
    bytes_response(
        status,
        "text/plain; charset=utf-8",
        text.as_bytes().to_vec(),
    )
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn error_response(error: &Error) -> Response<Full<Bytes>> {
    let status = match error {
        Error::InvalidQuery { .. }
        | Error::BadBodyVersion(_)
        | Error::BadPageNumber(_)
        | Error::BadRequestBody(_) => StatusCode::BAD_REQUEST,
        Error::NxEmail(_)
        | Error::NxAttachment(_)
        | Error::NxPart(_)
        | Error::NxRelay(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    log::error!("error: {} (status={})", error, status);
    plain_response(status, &error.to_string())
}

fn serve_static(path: &str) -> Response<Full<Bytes>> {
    let (content_type, body) = match path {
        "/style.css" => ("text/css", STYLE_CSS),
        "/script.js" => ("application/javascript", SCRIPT_JS),
        "/" | "/index.html" => ("text/html", INDEX_HTML),
        // Unknown paths fall back to the single-page front-end
        _ => {
            log::debug!("file not found: {}, defaulting to index.html", path);
            ("text/html", INDEX_HTML)
        },
    };
    bytes_response(StatusCode::OK, content_type, body.as_bytes().to_vec())
}

fn parse_query_params(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.unwrap_or("").split('&') {
        if pair.is_empty() {
            continue;
        }
        let (name, value) = match pair.split_once('=') {
            Some((name, value)) => (name, value),
            None => (pair, ""),
        };
        params.insert(
            percent_decode(name),
            percent_decode(&value.replace('+', " ")),
        );
    }
    params
}

fn percent_decode<S: AsRef<str>>(s: S) -> String {
    let bytes = s.as_ref().as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut ix = 0;
    while ix < bytes.len() {
        if bytes[ix] == b'%' {
            match bytes
                .get(ix + 1..ix + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                Some(byte) => {
                    decoded.push(byte);
                    ix += 3;
                    continue;
                },
                None => (),
            }
        }
        decoded.push(bytes[ix]);
        ix += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}
