//! Nova server queries and Cinder attachment lookups.

use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{VmDocuments, VmRef, VmSummary};
use crate::resource::VolumeId;
use crate::selection::{VmFilter, is_backup_supported};

use super::error::OpenStackError;
use super::http::Headers;
use super::types::{Link, ServerDetail, ServerEnvelope, ServerPage, VolumePage};
use super::OpenStackBackend;

/// Microversion that exposes server tags.
const NOVA_HEADERS: Headers<'static> = &[("X-OpenStack-Nova-API-Version", "2.26")];
const PAGE_LIMIT: u32 = 1000;

impl OpenStackBackend {
    pub(super) async fn list_servers(&self) -> Result<Vec<ServerDetail>, OpenStackError> {
        let first = format!(
            "{}/servers/detail?all_tenants=1&limit={PAGE_LIMIT}",
            self.endpoints.compute
        );
        let mut servers = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            let page: ServerPage = self.api.get_json(&url, NOVA_HEADERS).await?;
            servers.extend(page.servers);
            next = next_link(&page.servers_links, &url);
        }
        debug!(count = servers.len(), "listed servers");
        Ok(servers)
    }

    pub(super) async fn discover(&self, filter: &VmFilter) -> Result<Vec<VmRef>, OpenStackError> {
        let servers = self.list_servers().await?;
        Ok(servers
            .into_iter()
            .filter(|server| is_backup_supported(&server.status))
            .filter(|server| filter.matches_name(&server.name))
            .filter(|server| filter.matches_tags(&server.tags, &server.metadata))
            .map(|server| VmRef::new(server.name, server.id))
            .collect())
    }

    pub(super) async fn find_server(&self, name: &str) -> Result<Option<VmRef>, OpenStackError> {
        let base = format!("{}/servers/detail", self.endpoints.compute);
        let url = reqwest::Url::parse_with_params(&base, &[("all_tenants", "1"), ("name", name)])
            .map_err(|err| OpenStackError::Config(format!("invalid compute url {base}: {err}")))?;
        let page: ServerPage = self.api.get_json(url.as_str(), NOVA_HEADERS).await?;
        // Nova treats `name` as a regular expression; keep exact matches only.
        Ok(page
            .servers
            .into_iter()
            .find(|server| server.name == name)
            .map(|server| VmRef::new(server.name, server.id)))
    }

    pub(super) async fn describe(&self, id: &str) -> Result<Option<VmSummary>, OpenStackError> {
        let url = format!("{}/servers/{id}", self.endpoints.compute);
        let envelope: Option<ServerEnvelope> =
            self.api.get_optional_json(&url, NOVA_HEADERS).await?;
        Ok(envelope.map(|ServerEnvelope { server }| VmSummary {
            id: server.id,
            name: server.name,
            status: server.status,
        }))
    }

    pub(super) async fn documents(&self, vm: &VmRef) -> Result<VmDocuments, OpenStackError> {
        let server_url = format!("{}/servers/{}", self.endpoints.compute, vm.id);
        let config: Value = self.api.get_json(&server_url, NOVA_HEADERS).await?;
        let tags = self.optional_document(vm, &format!("{server_url}/tags")).await;
        let metadata = self
            .optional_document(vm, &format!("{server_url}/metadata"))
            .await;
        Ok(VmDocuments {
            config,
            tags,
            metadata,
        })
    }

    async fn optional_document(&self, vm: &VmRef, url: &str) -> Option<Value> {
        match self.api.get_json::<Value>(url, NOVA_HEADERS).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(vm = %vm.name, url, error = %err, "server document unavailable");
                None
            }
        }
    }

    pub(super) async fn volumes_attached_to(
        &self,
        vm: &VmRef,
    ) -> Result<Vec<VolumeId>, OpenStackError> {
        let first = format!(
            "{}/volumes/detail?all_tenants=1&limit={PAGE_LIMIT}",
            self.endpoints.volume
        );
        let mut attached = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            let page: VolumePage = self.api.get_json(&url, &[]).await?;
            attached.extend(
                page.volumes
                    .into_iter()
                    .filter(|volume| {
                        volume
                            .attachments
                            .iter()
                            .any(|attachment| attachment.server_id == vm.id)
                    })
                    .map(|volume| VolumeId::new(volume.id)),
            );
            next = next_link(&page.volumes_links, &url);
        }
        debug!(vm = %vm.name, count = attached.len(), "listed attached volumes");
        Ok(attached)
    }
}

/// Returns the `next` pagination link unless it would revisit `current`.
fn next_link(links: &[Link], current: &str) -> Option<String> {
    links
        .iter()
        .find(|link| link.rel == "next")
        .map(|link| link.href.clone())
        .filter(|href| !href.is_empty() && href != current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(rel: &str, href: &str) -> Link {
        Link {
            rel: rel.to_owned(),
            href: href.to_owned(),
        }
    }

    #[test]
    fn next_link_follows_the_next_relation() {
        let links = vec![link("self", "https://nova/a"), link("next", "https://nova/b")];
        assert_eq!(
            next_link(&links, "https://nova/a").as_deref(),
            Some("https://nova/b")
        );
    }

    #[test]
    fn next_link_stops_on_a_repeated_page() {
        let links = vec![link("next", "https://nova/a")];
        assert_eq!(next_link(&links, "https://nova/a"), None);
        assert_eq!(next_link(&[], "https://nova/a"), None);
    }
}
