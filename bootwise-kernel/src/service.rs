/**
 * PROFILE SERVICE - One booting device in, one boot artifact out
 *
 * ROLE:
 * Glues the pipeline stages together for the HTTP layer:
 *   lookup mapping -> identity -> discovery -> profile -> render
 *
 * Every stage receives its collaborators from the KernelContext, so the
 * service owns no state beyond the stage objects themselves.
 */

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::discovery::DiscoveryTrigger;
use crate::error::{KernelError, KernelResult};
use crate::identity::IdentityResolver;
use crate::lookup::{LookupMapper, LookupRequest};
use crate::models::{ProfileDescriptor, ResolveOptions};
use crate::ports::LookupStore;
use crate::profiles::{ProfileResolver, REDIRECT_PROFILE};
use crate::protocol::EventPublisher;
use crate::render::{ProfileLibrary, RenderScope, Renderer};
use crate::state::KernelContext;

/// Trims, lowercases and drops empty MAC entries.
pub fn normalize_macs(macs: &[String]) -> Vec<String> {
    macs.iter()
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}

pub struct ProfileService {
    mapper: LookupMapper,
    identity: IdentityResolver,
    profiles: ProfileResolver,
    renderer: Renderer,
    lookups: Arc<dyn LookupStore>,
    events: Arc<dyn EventPublisher>,
}

impl ProfileService {
    pub fn new(ctx: KernelContext) -> Self {
        let discovery = DiscoveryTrigger::new(ctx.workflows.clone(), ctx.tasks.clone(), ctx.lookups.clone());
        Self {
            mapper: LookupMapper::new(ctx.lookups.clone()),
            identity: IdentityResolver::new(
                ctx.nodes.clone(),
                ctx.lookups.clone(),
                ctx.tasks.clone(),
                ctx.events.clone(),
                discovery,
            ),
            profiles: ProfileResolver::new(ctx.workflows.clone(), ctx.tasks.clone()),
            renderer: Renderer::new(ctx.library, ctx.config, ctx.lookups.clone()),
            lookups: ctx.lookups,
            events: ctx.events,
        }
    }

    pub fn library(&self) -> &ProfileLibrary {
        self.renderer.library()
    }

    /// Resolves the artifact for a compute node identified by the MACs it
    /// reported. Without MACs the device is sent to the redirect script.
    pub async fn get_profiles(&self, req: &LookupRequest) -> KernelResult<ProfileDescriptor> {
        self.mapper.set_lookup_best_effort(req).await;

        let macs = req.macs.as_deref().map(normalize_macs).unwrap_or_default();
        if macs.is_empty() {
            debug!(requester = ?req.requester_ip, "no macs reported, redirecting");
            let mut descriptor = ProfileDescriptor::new(REDIRECT_PROFILE, Default::default());
            descriptor.ignore_lookup = true;
            return Ok(descriptor);
        }

        let resolved = async {
            let node = self.identity.resolve_node(&macs, &ResolveOptions::compute()).await?;
            self.profiles.resolve_profile(&node).await
        }
        .await;
        resolved.map_err(KernelError::into_response_error)
    }

    /// Switches identify themselves by source IP only; the MAC comes from the
    /// lookup table populated by earlier DHCP traffic.
    pub async fn get_profiles_switch_vendor(&self, requester_ip: &str, vendor: Option<&str>) -> KernelResult<ProfileDescriptor> {
        let record = self
            .lookups
            .find_one_by_term(requester_ip)
            .await?
            .ok_or_else(|| KernelError::not_found(format!("No lookup record for {requester_ip}")))?;

        let macs = normalize_macs(&[record.mac_address]);
        let node = self.identity.resolve_node(&macs, &ResolveOptions::switch(vendor)).await?;
        self.profiles.resolve_profile(&node).await
    }

    pub async fn render(&self, descriptor: &ProfileDescriptor, scope: &RenderScope) -> KernelResult<String> {
        self.renderer.render(descriptor, scope).await
    }

    /// Logs the report and forwards it on the bus. Never fails the caller.
    pub async fn report_switch_error(&self, report: &Value) {
        error!(report = %report, "switch error reported");
        if let Err(e) = self.events.publish_switch_error(report).await {
            warn!(error = %e, "switch error forward failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_macs() {
        let macs = vec![" AA:BB:CC:DD:EE:FF ".to_string(), String::new(), "11:22:33:44:55:66".to_string()];
        assert_eq!(normalize_macs(&macs), vec!["aa:bb:cc:dd:ee:ff", "11:22:33:44:55:66"]);
    }
}
