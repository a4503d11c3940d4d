use std::collections::BTreeSet;
use std::net::IpAddr;

use http::{HeaderMap, Method};

use crate::matcher::IndexSet;

use super::context::LoggedUser;

/// Read-only view of an incoming request, supplied by the host.
///
/// Index-related methods describe the request as the store would execute it.
/// `expanded_indices` and `all_indices_and_aliases` may consult the host's
/// cluster metadata.
pub trait RequestView: Send + Sync {
    fn id(&self) -> &str;

    fn remote_address(&self) -> Option<IpAddr>;

    fn method(&self) -> &Method;

    fn uri(&self) -> &str;

    fn headers(&self) -> &HeaderMap;

    fn content_length(&self) -> usize;

    /// Internal operation name, e.g. `indices:data/read/search`.
    fn action(&self) -> &str;

    fn involves_indices(&self) -> bool;

    fn indices(&self) -> IndexSet;

    fn is_read_request(&self) -> bool;

    /// Every concrete index and alias known to the host.
    fn all_indices_and_aliases(&self) -> IndexSet;

    /// Concrete indices the given names (possibly wildcards) resolve to.
    fn expanded_indices(&self, requested: &IndexSet) -> IndexSet;

    /// Index sets of the sub-requests of a composite request, by position.
    fn sub_requests(&self) -> Vec<IndexSet> {
        Vec::new()
    }

    fn is_composite(&self) -> bool {
        !self.sub_requests().is_empty()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }
}

/// Mutation surface the host exposes for committing an allowed decision.
pub trait RequestSink {
    fn set_indices(&mut self, indices: IndexSet);

    fn set_sub_request_indices(&mut self, position: usize, indices: IndexSet);

    fn set_logged_user(&mut self, user: LoggedUser);

    fn set_response_header(&mut self, name: &str, value: &str);

    fn set_field_filter(&mut self, fields: BTreeSet<String>);
}
