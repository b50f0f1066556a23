//! WADO-RS network data source: fetches
//! `{baseUrl}/studies/{study}/series/{series}/instances/{instance}[/frames/{n}]`, retrying
//! retryable conditions with exponential backoff and coalescing concurrent identical
//! requests into a single fetch.
//!
//! `instance_id` as seen by [`DataSource`] is the `study/series/instance` triple joined by
//! `/`, since the trait is shared with the single-UID local source.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::datasource::{DataSource, LoadOptions, LruCache, Metadata};
use crate::error::{CoreError, CoreResult};
use crate::image_info::{extract_image_info, CalibrationData};
use crate::parser::parse;
use crate::pixeldata::extract_pixel_data;
use crate::config::WadoConfig;

/// Result of one attempt against the network, independent of retry policy.
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Injectable transport so the retry, backoff, and coalescing logic is testable without a
/// socket, the same way [`crate::decode::HardwareDecoder`] stands in for real hardware.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, headers: &HashMap<String, String>, timeout_ms: u64) -> Result<HttpResponse, String>;
}

fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

struct InFlight {
    result: Mutex<Option<Result<Vec<u8>, String>>>,
    cond: Condvar,
}

pub struct WadoDataSource {
    config: WadoConfig,
    transport: Box<dyn HttpTransport>,
    metadata_cache: Mutex<LruCache<String, Metadata>>,
    frame_cache: Mutex<LruCache<String, Vec<u8>>>,
    in_flight: Mutex<HashMap<String, Arc<InFlight>>>,
}

impl WadoDataSource {
    pub fn new(config: WadoConfig, transport: Box<dyn HttpTransport>) -> Self {
        let frame_cache_size = config.frame_cache_size;
        let metadata_cache_size = config.metadata_cache_size;
        WadoDataSource {
            config,
            transport,
            metadata_cache: Mutex::new(LruCache::new(metadata_cache_size)),
            frame_cache: Mutex::new(LruCache::new(frame_cache_size)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = self.config.headers.clone();
        if let Some(token) = &self.config.auth_token {
            headers.insert("Authorization".into(), format!("Bearer {token}"));
        }
        headers
    }

    fn instance_url(&self, study: &str, series: &str, instance: &str) -> String {
        format!(
            "{}/studies/{study}/series/{series}/instances/{instance}",
            self.config.base_url
        )
    }

    /// One attempt + retry loop for a single URL: `delay(n) = initial * 2^n`,
    /// default initial 1s, up to `maxRetries` retries. Does not deduplicate.
    fn fetch_with_retry(&self, url: &str) -> CoreResult<Vec<u8>> {
        let headers = self.headers();
        let mut attempt = 0u32;
        loop {
            match self.transport.get(url, &headers, self.config.timeout_ms) {
                Ok(resp) if (200..300).contains(&resp.status) => return Ok(resp.body),
                Ok(resp) if is_retryable_status(resp.status) => {
                    if attempt >= self.config.max_retries {
                        return Err(CoreError::NetworkFailed {
                            reason: format!("http {} after {attempt} retries", resp.status),
                        });
                    }
                    let delay = Duration::from_secs_f64(2f64.powi(attempt as i32));
                    log::warn!("wado fetch of {url} returned {}, retrying in {delay:?}", resp.status);
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Ok(resp) => {
                    return Err(CoreError::NetworkFailed {
                        reason: format!("http {} (non-retryable)", resp.status),
                    })
                }
                Err(reason) => {
                    if attempt >= self.config.max_retries {
                        return Err(CoreError::NetworkFailed { reason });
                    }
                    std::thread::sleep(Duration::from_secs_f64(2f64.powi(attempt as i32)));
                    attempt += 1;
                }
            }
        }
    }

    /// Coalesces concurrent fetches of the same URL into a single underlying request:
    /// the first caller becomes the leader and runs [`Self::fetch_with_retry`];
    /// everyone else blocks on the leader's result.
    fn fetch_coalesced(&self, url: &str) -> CoreResult<Vec<u8>> {
        let (entry, is_leader) = {
            let mut map = self.in_flight.lock().unwrap();
            if let Some(existing) = map.get(url) {
                (existing.clone(), false)
            } else {
                let entry = Arc::new(InFlight {
                    result: Mutex::new(None),
                    cond: Condvar::new(),
                });
                map.insert(url.to_string(), entry.clone());
                (entry, true)
            }
        };

        if !is_leader {
            let mut result = entry.result.lock().unwrap();
            while result.is_none() {
                result = entry.cond.wait(result).unwrap();
            }
            return match result.clone().unwrap() {
                Ok(bytes) => Ok(bytes),
                Err(reason) => Err(CoreError::NetworkFailed { reason }),
            };
        }

        let outcome = self.fetch_with_retry(url);
        {
            let mut slot = entry.result.lock().unwrap();
            *slot = Some(outcome.as_ref().map(|b| b.clone()).map_err(|e| e.to_string()));
        }
        entry.cond.notify_all();
        self.in_flight.lock().unwrap().remove(url);
        outcome
    }

    fn metadata_impl(&self, instance_id: &str, opts: &LoadOptions) -> CoreResult<Metadata> {
        if opts.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        if !opts.bypass_cache {
            if let Some(cached) = self.metadata_cache.lock().unwrap().get(&instance_id.to_string()) {
                return Ok(cached.clone());
            }
        }

        let (study, series, instance) = parse_triple(instance_id)?;
        let url = self.instance_url(study, series, instance);
        let bytes = self.fetch_coalesced(&url)?;
        let dataset = parse(&bytes)?;
        let image_info = extract_image_info(&bytes, &dataset)?;
        let pixel_data = extract_pixel_data(&bytes, &dataset, &image_info)?;
        let mut calibration = CalibrationData::from_image_info(&image_info);

        if calibration.is_none() {
            // Calibration absent from the metadata reply: one-shot refetch of the full
            // instance to recover it.
            let recovery_url = format!("{url}#full-instance");
            if let Ok(full_bytes) = self.fetch_coalesced(&recovery_url) {
                if let Ok(full_dataset) = parse(&full_bytes) {
                    if let Ok(full_info) = extract_image_info(&full_bytes, &full_dataset) {
                        calibration = CalibrationData::from_image_info(&full_info);
                    }
                }
            }
        }

        let metadata = Metadata {
            frame_count: pixel_data.frame_count(),
            is_encapsulated: dataset.is_encapsulated(),
            transfer_syntax: dataset.transfer_syntax_uid.clone(),
            image_info,
            calibration,
        };
        self.metadata_cache
            .lock()
            .unwrap()
            .put(instance_id.to_string(), metadata.clone());
        Ok(metadata)
    }

    fn frame_impl(&self, instance_id: &str, frame_number: u32, opts: &LoadOptions) -> CoreResult<Vec<u8>> {
        if opts.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let cache_key = format!("{instance_id}:{frame_number}");
        if !opts.bypass_cache {
            if let Some(cached) = self.frame_cache.lock().unwrap().get(&cache_key) {
                return Ok(cached.clone());
            }
        }

        let (study, series, instance) = parse_triple(instance_id)?;
        let url = format!("{}/frames/{frame_number}", self.instance_url(study, series, instance));
        let bytes = self.fetch_coalesced(&url)?;
        self.frame_cache.lock().unwrap().put(cache_key, bytes.clone());
        Ok(bytes)
    }
}

fn parse_triple(instance_id: &str) -> CoreResult<(&str, &str, &str)> {
    let mut parts = instance_id.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(study), Some(series), Some(instance)) if !study.is_empty() && !series.is_empty() && !instance.is_empty() => {
            Ok((study, series, instance))
        }
        _ => Err(CoreError::NetworkFailed {
            reason: format!("instance id `{instance_id}` is not a study/series/instance triple"),
        }),
    }
}

impl DataSource for WadoDataSource {
    fn load_metadata(&mut self, instance_id: &str, opts: &LoadOptions) -> CoreResult<Metadata> {
        self.metadata_impl(instance_id, opts)
    }

    fn load_frame(&mut self, instance_id: &str, frame_number: u32, opts: &LoadOptions) -> CoreResult<Vec<u8>> {
        self.frame_impl(instance_id, frame_number, opts)
    }
}
