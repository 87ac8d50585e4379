//! The mock registry.
//!
//! Holds the ignore-lists, the fingerprint → response map and the call
//! ledger behind one lock, so a lookup is fingerprinted, recorded and
//! answered as a single step.

use crate::config::{GlobalSettings, MockPlugConfig};
use crate::error::Result;
use crate::fingerprint::{Canonicalizer, Fingerprint};
use crate::response::{MockResponse, HTTP_SUCCESS};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Lookup counters since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub lookups_total: u64,
    pub lookups_matched: u64,
    pub lookups_unmatched: u64,
    pub mocks_registered: usize,
}

#[derive(Default)]
struct RegistryState {
    ignored_query_params: HashSet<String>,
    ignored_headers: HashSet<String>,
    settings: GlobalSettings,
    mocks: HashMap<Fingerprint, MockResponse>,
    /// One entry per lookup, matched or not.
    calls: Vec<Fingerprint>,
    /// Set by the first registration; survives `reset`.
    active: bool,
    lookups_matched: u64,
    lookups_unmatched: u64,
}

impl RegistryState {
    fn canonicalizer(&self) -> Canonicalizer<'_> {
        Canonicalizer {
            ignored_query_params: &self.ignored_query_params,
            ignored_headers: &self.ignored_headers,
            case_insensitive_headers: self.settings.case_insensitive_headers,
        }
    }

    fn fingerprint(
        &self,
        verb: &str,
        uri: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Fingerprint> {
        self.canonicalizer().fingerprint(verb, uri, headers)
    }
}

/// Registry of canned HTTP responses keyed by request fingerprint.
///
/// Create one per test session and [`reset`](Self::reset) it between tests.
/// Share it across threads behind an `Arc`; every operation takes the same
/// internal lock.
#[derive(Default)]
pub struct MockRegistry {
    state: Mutex<RegistryState>,
}

impl MockRegistry {
    /// Create an empty registry with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with the given settings.
    pub fn with_settings(settings: GlobalSettings) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                settings,
                ..RegistryState::default()
            }),
        }
    }

    /// Build a registry from configuration: settings, ignore-lists, then
    /// every preset mock in declaration order.
    pub fn from_config(config: &MockPlugConfig) -> Result<Self> {
        config.validate()?;

        let registry = Self::with_settings(config.settings.clone());
        for name in &config.ignore.query_params {
            registry.ignore_query_param(name.as_str());
        }
        for name in &config.ignore.headers {
            registry.ignore_header(name.as_str());
        }
        for mock in &config.mocks {
            registry.register_with(
                &mock.request.verb,
                &mock.request.uri,
                &mock.request.headers,
                mock.response.body_value()?,
                mock.response.headers.clone(),
                mock.response.status,
            )?;
        }

        info!(
            mocks = config.mocks.len(),
            ignored_query_params = config.ignore.query_params.len(),
            ignored_headers = config.ignore.headers.len(),
            "Mock registry initialized"
        );

        Ok(registry)
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current settings.
    pub fn settings(&self) -> GlobalSettings {
        self.state().settings.clone()
    }

    /// Exclude a query parameter from fingerprinting for the registry's lifetime.
    pub fn ignore_query_param(&self, name: impl Into<String>) {
        let name = name.into();
        debug!(param = %name, "Ignoring query parameter");
        self.state().ignored_query_params.insert(name);
    }

    /// Exclude a header from fingerprinting for the registry's lifetime.
    pub fn ignore_header(&self, name: impl Into<String>) {
        let name = name.into();
        debug!(header = %name, "Ignoring header");
        self.state().ignored_headers.insert(name);
    }

    /// Register `body` with an empty header map and status 200.
    pub fn register(
        &self,
        verb: &str,
        uri: &str,
        headers: &HashMap<String, String>,
        body: serde_json::Value,
    ) -> Result<Fingerprint> {
        self.register_with(verb, uri, headers, body, HashMap::new(), HTTP_SUCCESS)
    }

    /// Register a canned response. Registering the same fingerprint twice
    /// replaces the earlier response.
    pub fn register_with(
        &self,
        verb: &str,
        uri: &str,
        headers: &HashMap<String, String>,
        body: serde_json::Value,
        response_headers: HashMap<String, String>,
        status: u16,
    ) -> Result<Fingerprint> {
        let mut state = self.state();
        let fingerprint = state.fingerprint(verb, uri, headers)?;

        let response = MockResponse::new(verb, body)
            .with_headers(response_headers)
            .with_status(status);
        let replaced = state.mocks.insert(fingerprint, response).is_some();
        state.active = true;

        debug!(
            verb = %verb,
            uri = %uri,
            status,
            fingerprint = %fingerprint,
            replaced,
            "Registered mock"
        );

        Ok(fingerprint)
    }

    /// Record the request in the call ledger and return its mock, if any.
    ///
    /// `Ok(None)` means no mock matched; the ledger is appended either way.
    pub fn lookup(
        &self,
        verb: &str,
        uri: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Option<MockResponse>> {
        let mut state = self.state();
        let fingerprint = state.fingerprint(verb, uri, headers)?;
        state.calls.push(fingerprint);

        let response = state.mocks.get(&fingerprint).cloned();
        match &response {
            Some(r) => {
                state.lookups_matched += 1;
                if state.settings.log_matches {
                    info!(
                        verb = %verb,
                        uri = %uri,
                        status = r.status,
                        fingerprint = %fingerprint,
                        "Request matched mock"
                    );
                }
            }
            None => {
                state.lookups_unmatched += 1;
                if state.settings.log_unmatched {
                    warn!(
                        verb = %verb,
                        uri = %uri,
                        fingerprint = %fingerprint,
                        "No matching mock found"
                    );
                }
            }
        }

        Ok(response)
    }

    /// Whether a lookup with this fingerprint was ever made.
    pub fn verify_called(
        &self,
        verb: &str,
        uri: &str,
        headers: &HashMap<String, String>,
    ) -> Result<bool> {
        let state = self.state();
        let fingerprint = state.fingerprint(verb, uri, headers)?;
        Ok(state.calls.contains(&fingerprint))
    }

    /// Number of lookups recorded with this fingerprint.
    pub fn call_count(
        &self,
        verb: &str,
        uri: &str,
        headers: &HashMap<String, String>,
    ) -> Result<usize> {
        let state = self.state();
        let fingerprint = state.fingerprint(verb, uri, headers)?;
        Ok(state.calls.iter().filter(|c| **c == fingerprint).count())
    }

    /// Whether any lookup happened since the last reset.
    pub fn verify_any_call(&self) -> bool {
        !self.state().calls.is_empty()
    }

    /// Whether every registered mock was looked up at least once.
    pub fn verify_all_called(&self) -> bool {
        let state = self.state();
        let called: HashSet<&Fingerprint> = state.calls.iter().collect();
        state.mocks.keys().all(|fp| called.contains(fp))
    }

    /// Registered mocks never looked up, in fingerprint order.
    pub fn uncalled(&self) -> Vec<(Fingerprint, MockResponse)> {
        let state = self.state();
        let called: HashSet<&Fingerprint> = state.calls.iter().collect();
        let mut uncalled: Vec<_> = state
            .mocks
            .iter()
            .filter(|(fp, _)| !called.contains(fp))
            .map(|(fp, response)| (*fp, response.clone()))
            .collect();
        uncalled.sort_by_key(|(fp, _)| *fp);
        uncalled
    }

    /// The call ledger, oldest first.
    pub fn calls(&self) -> Vec<Fingerprint> {
        self.state().calls.clone()
    }

    /// Compute a fingerprint under the current ignore-lists without recording it.
    pub fn fingerprint(
        &self,
        verb: &str,
        uri: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Fingerprint> {
        self.state().fingerprint(verb, uri, headers)
    }

    /// Whether any mock was ever registered. Transports only intercept when set.
    pub fn is_active(&self) -> bool {
        self.state().active
    }

    pub fn len(&self) -> usize {
        self.state().mocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().mocks.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state();
        RegistryStats {
            lookups_total: state.lookups_matched + state.lookups_unmatched,
            lookups_matched: state.lookups_matched,
            lookups_unmatched: state.lookups_unmatched,
            mocks_registered: state.mocks.len(),
        }
    }

    /// Drop all mocks, the call ledger and the counters. Ignore-lists and
    /// settings are kept.
    pub fn reset(&self) {
        let mut state = self.state();
        let mocks = state.mocks.len();
        let calls = state.calls.len();
        state.mocks.clear();
        state.calls.clear();
        state.lookups_matched = 0;
        state.lookups_unmatched = 0;
        info!(mocks, calls, "Mock registry reset");
    }
}
