use crate::core::mapreduce::{MapContext, Mapper};
use crate::domain::model::{DeletionRequest, DomainResource};
use crate::utils::error::Result;
use std::sync::Arc;

/// Map phase over every domain in the registry.
///
/// Emits `(request, true)` for each request whose target is linked from a
/// domain that was active at the request's snapshot time. For the synthetic
/// empty unit it emits `(request, false)` for every request, so the reducer
/// runs for each request even when no domain references its target.
pub struct DeleteContactsAndHostsMapper {
    deletion_requests: Arc<[DeletionRequest]>,
}

impl DeleteContactsAndHostsMapper {
    pub fn new(deletion_requests: impl Into<Arc<[DeletionRequest]>>) -> Self {
        Self {
            deletion_requests: deletion_requests.into(),
        }
    }
}

impl Mapper for DeleteContactsAndHostsMapper {
    type Input = DomainResource;
    type Key = DeletionRequest;
    type Value = bool;

    fn map(
        &self,
        domain: Option<&DomainResource>,
        ctx: &mut MapContext<DeletionRequest, bool>,
    ) -> Result<()> {
        for request in self.deletion_requests.iter() {
            match domain {
                None => ctx.emit(request.clone(), false),
                Some(domain) => {
                    if domain.is_active_at(request.last_update_time)
                        && request.key.is_referenced_by(domain)?
                    {
                        ctx.emit(request.clone(), true);
                        ctx.increment_counter(format!(
                            "active Domain-{} links found",
                            request.key.kind
                        ));
                    }
                }
            }
        }
        if domain.is_some() {
            ctx.increment_counter("domains processed");
        }
        Ok(())
    }
}
