use crate::config::{AppConfig, SiteSettings};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

/// Commerce settings resolved for one tenant site.
#[derive(Clone, Debug)]
pub struct SiteConfig {
    /// Registry key (host, or "default")
    pub key: String,
    pub name: String,
    pub currency: String,
    /// None means "not configured" and is priced as zero; Some(0) is a
    /// deliberate zero rate. The two are kept apart on purpose.
    pub tax_rate: Option<Decimal>,
    pub shipping_cost: Option<Decimal>,
}

impl SiteConfig {
    fn from_settings(key: &str, settings: &SiteSettings) -> Self {
        Self {
            key: key.to_string(),
            name: settings.name.clone(),
            currency: settings.currency.clone(),
            tax_rate: settings.tax_rate,
            shipping_cost: settings.shipping_cost,
        }
    }
}

/// Registry of tenant sites keyed by request host.
///
/// Populated once at startup and mutated only through [`SiteRegistry::reload`].
/// Handed to components explicitly; there is no process-global instance.
#[derive(Debug)]
pub struct SiteRegistry {
    default: SiteConfig,
    by_host: RwLock<HashMap<String, SiteConfig>>,
}

pub const DEFAULT_SITE_KEY: &str = "default";

impl SiteRegistry {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let default = SiteConfig::from_settings(DEFAULT_SITE_KEY, &cfg.default_site);
        let by_host = cfg
            .sites
            .iter()
            .map(|(host, settings)| {
                (host.clone(), SiteConfig::from_settings(host, settings))
            })
            .collect::<HashMap<_, _>>();

        info!(sites = by_host.len() + 1, "Site registry initialized");

        Self {
            default,
            by_host: RwLock::new(by_host),
        }
    }

    /// Resolves the site for a request host, falling back to the default site.
    pub fn resolve(&self, host: Option<&str>) -> SiteConfig {
        if let Some(host) = host {
            // Strip any port suffix before matching
            let bare = host.rsplit_once(':').map_or(host, |(h, _)| h);
            let by_host = self.by_host.read().unwrap_or_else(|e| e.into_inner());
            if let Some(site) = by_host.get(bare).or_else(|| by_host.get(host)) {
                return site.clone();
            }
        }
        self.default.clone()
    }

    /// Replaces the per-host table. The only mutation path after startup.
    pub fn reload(&self, sites: &HashMap<String, SiteSettings>) {
        let replacement = sites
            .iter()
            .map(|(host, settings)| {
                (host.clone(), SiteConfig::from_settings(host, settings))
            })
            .collect::<HashMap<_, _>>();

        let mut by_host = self.by_host.write().unwrap_or_else(|e| e.into_inner());
        *by_host = replacement;
        info!(sites = by_host.len() + 1, "Site registry reloaded");
    }
}
