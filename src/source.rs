//! Fetch collaborator contract
//!
//! The engine never performs I/O itself. A `Fetcher` supplies `(status, body)` for a
//! request; transport, authentication, retries and timeouts belong to the implementor.
//!
//! `MemoryFetcher` replays canned responses and records every call, which makes the
//! whole pipeline testable without a network.

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::debug;

use crate::error::FetchError;

/// One outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Status and body returned by a fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

/// Source adapter: supplies raw text for a request
///
/// # Example
///
/// ```ignore
/// impl Fetcher for HttpFetcher {
///     fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
///         let response = self.client.get(&request.url).send().map_err(|e| {
///             FetchError::Transport { url: request.url.clone(), message: e.to_string() }
///         })?;
///         Ok(FetchResponse { status: response.status().as_u16(), body: response.text()? })
///     }
/// }
/// ```
pub trait Fetcher {
    /// Perform the request
    ///
    /// Returns `Err` only for transport failures; HTTP error statuses are responses.
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        (**self).fetch(request)
    }
}

/// Fetch one unit and classify the response
///
/// # Returns
///
/// * `Ok(String)` - Body of a 2xx response; an empty body means "no data"
/// * `Ok(String::new())` - 404, data not published for this unit
/// * `Err(FetchError)` - Transport failure or any other non-success status
pub fn fetch_text<F: Fetcher + ?Sized>(
    fetcher: &F,
    request: &FetchRequest,
) -> Result<String, FetchError> {
    let response = fetcher.fetch(request)?;

    match response.status {
        200..=299 => Ok(response.body),
        404 => {
            debug!(url = %request.url, "no data published for unit");
            Ok(String::new())
        }
        status => Err(FetchError::Status {
            url: request.url.clone(),
            status,
        }),
    }
}

// ============================================================================
// Replay fetcher
// ============================================================================

#[derive(Debug, Clone)]
enum Canned {
    Response(FetchResponse),
    Failure(String),
}

/// In-memory fetcher serving canned responses by URL
///
/// Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    responses: HashMap<String, Canned>,
    requested: RefCell<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with `status` for `url`
    pub fn with_response(
        mut self,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        self.responses.insert(
            url.into(),
            Canned::Response(FetchResponse {
                status,
                body: body.into(),
            }),
        );
        self
    }

    /// Fail requests for `url` with a transport error
    pub fn with_failure(mut self, url: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses.insert(url.into(), Canned::Failure(message.into()));
        self
    }

    /// Number of fetch calls made so far
    pub fn calls(&self) -> usize {
        self.requested.borrow().len()
    }

    /// URLs requested so far, in call order
    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.requested.borrow_mut().push(request.url.clone());

        match self.responses.get(&request.url) {
            Some(Canned::Response(response)) => Ok(response.clone()),
            Some(Canned::Failure(message)) => Err(FetchError::Transport {
                url: request.url.clone(),
                message: message.clone(),
            }),
            None => Ok(FetchResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}
