//! Round-robin pool of egress points
//!
//! Each egress owns its own `reqwest::Client`, because reqwest binds proxies
//! at client construction. With no proxies configured the pool holds a single
//! direct client.

use reqwest::{Client, Proxy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::FetchError;

#[derive(Debug, Clone)]
pub struct Egress {
    /// Proxy URL, or `direct`
    pub label: String,
    pub client: Client,
}

#[derive(Debug)]
pub struct EgressPool {
    egresses: Vec<Egress>,
    cursor: AtomicUsize,
}

impl EgressPool {
    /// Build one client per proxy URL, or a single direct client if `proxies` is empty
    pub fn build(proxies: &[String], timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let egresses = if proxies.is_empty() {
            vec![Egress {
                label: "direct".to_string(),
                client: client_builder(timeout, user_agent).build()?,
            }]
        } else {
            proxies
                .iter()
                .map(|url| {
                    let client = client_builder(timeout, user_agent)
                        .proxy(Proxy::all(url.as_str())?)
                        .build()?;
                    Ok(Egress {
                        label: url.clone(),
                        client,
                    })
                })
                .collect::<Result<Vec<_>, FetchError>>()?
        };

        Ok(Self::from_egresses(egresses))
    }

    /// Wrap prepared egresses; an empty list falls back to a default direct client
    pub fn from_egresses(mut egresses: Vec<Egress>) -> Self {
        if egresses.is_empty() {
            egresses.push(Egress {
                label: "direct".to_string(),
                client: Client::new(),
            });
        }

        Self {
            egresses,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.egresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.egresses.is_empty()
    }

    /// Egress the next request should start from
    pub fn current(&self) -> (usize, &Egress) {
        let index = self.cursor.load(Ordering::Relaxed) % self.egresses.len();
        (index, &self.egresses[index])
    }

    /// Move the shared cursor past `from`, returning the new egress.
    ///
    /// Concurrent requests that were refused by the same egress advance the
    /// cursor only once.
    pub fn rotate_from(&self, from: usize) -> (usize, &Egress) {
        let next = (from + 1) % self.egresses.len();
        let _ = self.cursor.compare_exchange(
            from,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
        (next, &self.egresses[next])
    }
}

fn client_builder(timeout: Duration, user_agent: &str) -> reqwest::ClientBuilder {
    Client::builder().timeout(timeout).user_agent(user_agent.to_string())
}
