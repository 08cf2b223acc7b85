//! Exception values and their classification hierarchy.
//!
//! Handlers are registered against a [`Category`], a named node in a static
//! tree of exception kinds. Classification replaces the class-ancestry walk a
//! dynamic language would perform: looking up a handler walks the raised
//! exception's category ancestry most-specific-first and the first hit wins.

use std::error::Error as StdError;
use std::fmt;

use axum::http::StatusCode;
use thiserror::Error;

pub mod http;

pub use http::HttpException;

/// Standard Result type for applications and handlers.
pub type Result<T> = std::result::Result<T, Exception>;

/// A node in the exception classification tree.
///
/// Categories are declared as `static` items so that a category is identified
/// by its identity and linked to its parent for ancestry walks:
///
/// ```
/// use ashgate::exception::{Category, EXCEPTION};
///
/// static TIMEOUT: Category = Category::new("timeout", Some(&EXCEPTION));
/// assert!(TIMEOUT.is_within(&EXCEPTION));
/// ```
#[derive(Debug)]
pub struct Category {
    name: &'static str,
    parent: Option<&'static Category>,
}

impl Category {
    pub const fn new(name: &'static str, parent: Option<&'static Category>) -> Self {
        Self { name, parent }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static Category> {
        self.parent
    }

    /// Iterate the classification ancestry, most specific first, starting
    /// with this category itself.
    pub fn ancestry(&'static self) -> Ancestry {
        Ancestry { next: Some(self) }
    }

    /// True if `other` appears anywhere in this category's ancestry.
    pub fn is_within(&'static self, other: &'static Category) -> bool {
        self.ancestry().any(|category| std::ptr::eq(category, other))
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Category {}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Iterator over a category and its ancestors.
pub struct Ancestry {
    next: Option<&'static Category>,
}

impl Iterator for Ancestry {
    type Item = &'static Category;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent;
        Some(current)
    }
}

/// Root of the classification tree. Every category should descend from it.
pub static EXCEPTION: Category = Category::new("exception", None);

/// Exceptions carrying an HTTP status code. Only exceptions in this branch
/// are eligible for status-code handler lookup.
pub static HTTP_EXCEPTION: Category = Category::new("http_exception", Some(&EXCEPTION));

/// The error value raised by applications and routed by the dispatch wrapper.
///
/// An `Exception` pairs a [`Category`] with an optional HTTP status code, a
/// human-readable detail and an optional boxed cause.
#[derive(Debug, Error)]
#[error("{detail}")]
pub struct Exception {
    category: &'static Category,
    status: Option<StatusCode>,
    detail: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Exception {
    pub fn new(category: &'static Category, detail: impl Into<String>) -> Self {
        Self {
            category,
            status: None,
            detail: detail.into(),
            source: None,
        }
    }

    /// An unclassified internal error, rooted directly at [`static@EXCEPTION`].
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(&EXCEPTION, detail)
    }

    /// The programmer-error signal raised when a handled exception arrives
    /// after `http.response.start` has already been forwarded. The original
    /// exception is preserved as the cause.
    pub fn response_already_started(cause: Exception) -> Self {
        Self {
            category: &EXCEPTION,
            status: None,
            detail: "Caught handled exception, but response already started.".to_string(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn category(&self) -> &'static Category {
        self.category
    }

    /// The HTTP status code, present only for HTTP exceptions.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// True when the exception carries a status code and is therefore
    /// eligible for status-table lookup.
    pub fn is_http(&self) -> bool {
        self.status.is_some()
    }
}
