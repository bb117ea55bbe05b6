//! Service catalog endpoint selection.

use crate::config::BackupConfig;

use super::error::OpenStackError;
use super::types::{CatalogEndpoint, CatalogEntry};

/// Catalog types and names under which a service may be registered.
#[derive(Clone, Copy, Debug)]
pub(super) struct CatalogService {
    pub(super) label: &'static str,
    types: &'static [&'static str],
    names: &'static [&'static str],
}

pub(super) const COMPUTE: CatalogService = CatalogService {
    label: "compute",
    types: &["compute"],
    names: &["nova"],
};

pub(super) const BLOCK_STORAGE: CatalogService = CatalogService {
    label: "block-storage",
    types: &["volumev3", "block-storage", "volumev2", "volume"],
    names: &["cinderv3", "cinder"],
};

pub(super) const IMAGE: CatalogService = CatalogService {
    label: "image",
    types: &["image"],
    names: &["glance"],
};

/// Base URLs of the services a run talks to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct Endpoints {
    pub(super) compute: String,
    pub(super) volume: String,
    pub(super) image: String,
}

impl Endpoints {
    /// Uses configured overrides where present and the catalog otherwise.
    pub(super) fn resolve(
        catalog: &[CatalogEntry],
        config: &BackupConfig,
    ) -> Result<Self, OpenStackError> {
        let pick = |explicit: Option<&String>, service: &CatalogService| {
            explicit
                .map(|url| url.trim().trim_end_matches('/').to_owned())
                .filter(|url| !url.is_empty())
                .or_else(|| select_endpoint(catalog, service, &config.region))
                .ok_or_else(|| OpenStackError::EndpointNotFound {
                    service: service.label,
                    region: config.region.clone(),
                })
        };
        Ok(Self {
            compute: compute_base(&pick(config.compute_url.as_ref(), &COMPUTE)?),
            volume: pick(config.volume_url.as_ref(), &BLOCK_STORAGE)?,
            image: image_base(&pick(config.image_url.as_ref(), &IMAGE)?),
        })
    }
}

/// Picks the best endpoint for `service`, preferring `region` and the public
/// interface. Catalog types are tried in order before names.
pub(super) fn select_endpoint(
    catalog: &[CatalogEntry],
    service: &CatalogService,
    region: &str,
) -> Option<String> {
    let by_type = service.types.iter().filter_map(|wanted| {
        catalog
            .iter()
            .find(|entry| entry.service_type.eq_ignore_ascii_case(wanted))
    });
    let by_name = service.names.iter().filter_map(|wanted| {
        catalog
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(wanted))
    });
    by_type
        .chain(by_name)
        .find_map(|entry| best_endpoint(&entry.endpoints, region))
}

fn best_endpoint(endpoints: &[CatalogEndpoint], region: &str) -> Option<String> {
    endpoints
        .iter()
        .filter(|endpoint| !endpoint.url.trim().is_empty())
        .max_by_key(|endpoint| {
            let in_region = [&endpoint.region, &endpoint.region_id]
                .into_iter()
                .flatten()
                .any(|name| name == region);
            let public = endpoint.interface.eq_ignore_ascii_case("public");
            (in_region, public)
        })
        .map(|endpoint| endpoint.url.trim().trim_end_matches('/').to_owned())
}

/// Appends the Nova API version when the catalog URL has none.
pub(super) fn compute_base(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.contains("/v2") {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/v2.1")
    }
}

/// Normalises a Glance URL to its `/v2` root.
pub(super) fn image_base(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/v2") {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/v2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn endpoint(interface: &str, region: &str, url: &str) -> CatalogEndpoint {
        CatalogEndpoint {
            interface: interface.to_owned(),
            region: Some(region.to_owned()),
            region_id: Some(region.to_owned()),
            url: url.to_owned(),
        }
    }

    fn entry(service_type: &str, name: &str, endpoints: Vec<CatalogEndpoint>) -> CatalogEntry {
        CatalogEntry {
            service_type: service_type.to_owned(),
            name: name.to_owned(),
            endpoints,
        }
    }

    #[test]
    fn prefers_public_endpoint_in_the_configured_region() {
        let catalog = vec![entry(
            "compute",
            "nova",
            vec![
                endpoint("internal", "RegionOne", "http://internal:8774/v2.1"),
                endpoint("public", "RegionTwo", "https://two:8774/v2.1"),
                endpoint("public", "RegionOne", "https://one:8774/v2.1/"),
            ],
        )];

        let selected = select_endpoint(&catalog, &COMPUTE, "RegionOne");

        assert_eq!(selected.as_deref(), Some("https://one:8774/v2.1"));
    }

    #[test]
    fn falls_back_to_any_interface_in_region() {
        let catalog = vec![entry(
            "image",
            "glance",
            vec![
                endpoint("public", "RegionTwo", "https://two:9292"),
                endpoint("admin", "RegionOne", "https://one-admin:9292"),
            ],
        )];

        let selected = select_endpoint(&catalog, &IMAGE, "RegionOne");

        assert_eq!(selected.as_deref(), Some("https://one-admin:9292"));
    }

    #[test]
    fn block_storage_prefers_volumev3_over_older_types() {
        let catalog = vec![
            entry(
                "volumev2",
                "cinderv2",
                vec![endpoint("public", "RegionOne", "https://cinder/v2/p")],
            ),
            entry(
                "volumev3",
                "cinderv3",
                vec![endpoint("public", "RegionOne", "https://cinder/v3/p")],
            ),
        ];

        let selected = select_endpoint(&catalog, &BLOCK_STORAGE, "RegionOne");

        assert_eq!(selected.as_deref(), Some("https://cinder/v3/p"));
    }

    #[test]
    fn missing_service_yields_none() {
        let catalog = vec![entry("network", "neutron", Vec::new())];
        assert_eq!(select_endpoint(&catalog, &IMAGE, "RegionOne"), None);
    }

    #[rstest]
    #[case("https://glance:9292", "https://glance:9292/v2")]
    #[case("https://glance:9292/", "https://glance:9292/v2")]
    #[case("https://glance:9292/v2", "https://glance:9292/v2")]
    fn image_base_ends_with_v2(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(image_base(raw), expected);
    }

    #[rstest]
    #[case("https://nova:8774", "https://nova:8774/v2.1")]
    #[case("https://nova:8774/v2.1/", "https://nova:8774/v2.1")]
    fn compute_base_carries_an_api_version(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(compute_base(raw), expected);
    }
}
