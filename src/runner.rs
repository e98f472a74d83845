use crate::config::{Config, SeenPolicy};
use crate::extract;
use crate::fetch::PageFetcher;
use crate::filter;
use crate::models::Ad;
use crate::store::SeenStore;
use crate::telegram::Deliverer;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub pages_fetched: u32,
    pub ads_collected: usize,
    pub delivered: usize,
    pub skipped_seen: usize,
    pub failed: usize,
}

/// One full pagination + fetch + filter + deliver cycle. Strictly
/// sequential; the caller is responsible for keeping runs from overlapping.
pub struct Runner {
    fetcher: Box<dyn PageFetcher>,
    deliverer: Box<dyn Deliverer>,
    store: SeenStore,
    config: Config,
}

impl Runner {
    pub fn new(
        fetcher: Box<dyn PageFetcher>,
        deliverer: Box<dyn Deliverer>,
        store: SeenStore,
        config: Config,
    ) -> Self {
        Runner {
            fetcher,
            deliverer,
            store,
            config,
        }
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut rng = StdRng::from_os_rng();
        let mut visited: HashSet<String> = HashSet::new();
        let mut collected: Vec<Ad> = Vec::new();

        tracing::info!(
            "Starting run: up to {} pages of {}/{}",
            self.config.pages,
            self.config.city_slug,
            self.config.category_path
        );

        'pages: for page in 1..=self.config.pages {
            let url = index_url(&self.config, page);
            let Some(index_html) = self
                .fetcher
                .fetch_page(&url)
                .await
                .with_context(|| format!("Fetching index page {}", page))?
            else {
                tracing::info!("Index page {} unavailable, stopping pagination", page);
                break;
            };
            summary.pages_fetched += 1;

            let links =
                extract::listing_links(&index_html, &self.config.base_url, &self.config.city_slug);
            tracing::info!("Page {}: {} listing links", page, links.len());

            for link in links {
                if !visited.insert(link.clone()) {
                    continue;
                }

                let html = match self.fetcher.fetch_page(&link).await {
                    Ok(Some(html)) => html,
                    Ok(None) => {
                        tracing::debug!("Ad page gone, skipping: {}", link);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to fetch {}: {:#}", link, e);
                        continue;
                    }
                };

                let ad = extract::parse_ad(&html, &link, &self.config, &mut rng);
                if let Err(rejection) = filter::check(&ad, &self.config) {
                    tracing::debug!("Ad {} rejected: {:?}", ad.id, rejection);
                    continue;
                }

                collected.push(ad);
                if collected.len() >= self.config.ads_limit {
                    tracing::info!(
                        "Ad limit {} reached, stopping collection",
                        self.config.ads_limit
                    );
                    break 'pages;
                }
            }

            if page < self.config.pages {
                tokio::time::sleep(Duration::from_millis(self.config.page_delay_ms)).await;
            }
        }

        summary.ads_collected = collected.len();

        for ad in &collected {
            if self.store.has_seen(&ad.id)? {
                summary.skipped_seen += 1;
                continue;
            }

            let delivered = self.deliverer.deliver(ad).await;
            if delivered {
                summary.delivered += 1;
                tracing::info!("Delivered ad {} ({})", ad.id, ad.title);
            } else {
                summary.failed += 1;
                tracing::warn!("Delivery failed for ad {}", ad.id);
            }

            match self.config.seen_policy {
                SeenPolicy::Attempt => self.store.mark_seen(&ad.id)?,
                SeenPolicy::Delivered => {
                    if delivered {
                        self.store.mark_seen(&ad.id)?;
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(self.config.send_delay_ms)).await;
        }

        tracing::info!(
            "Run finished: {} pages, {} collected, {} delivered, {} already seen, {} failed",
            summary.pages_fetched,
            summary.ads_collected,
            summary.delivered,
            summary.skipped_seen,
            summary.failed
        );
        Ok(summary)
    }
}

fn index_url(config: &Config, page: u32) -> String {
    format!(
        "{}/{}/{}?page={}",
        config.base_url.trim_end_matches('/'),
        urlencoding::encode(&config.city_slug),
        config.category_path,
        page
    )
}
