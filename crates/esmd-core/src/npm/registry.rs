//! npm registry metadata.
//!
//! [`PackageMetadataProvider`] is the synchronous seam the resolvers use.
//! [`RegistryMetadataProvider`] implements it over the async
//! [`RegistryClient`]; [`MemoryRegistry`] serves fixed metadata.

use super::manifest::PackageManifest;
use super::range::resolve_version;
use crate::error::{Error, Result};
use crate::sync::KeyedMutex;
use crate::version::user_agent;
use reqwest::Client;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;
use url::Url;

/// Package metadata lookup.
///
/// Implementations block; callers run them on blocking threads.
pub trait PackageMetadataProvider: Send + Sync {
    /// Manifest of the highest version satisfying `constraint`
    /// (a range, exact version, or dist-tag).
    fn manifest(&self, name: &str, constraint: &str) -> Result<PackageManifest>;

    /// Resolve `constraint` to an exact version.
    fn resolve_version(&self, name: &str, constraint: &str) -> Result<String> {
        self.manifest(name, constraint).map(|m| m.version)
    }

    /// Dist-tags of `name`, e.g. `latest -> 18.2.0`.
    fn dist_tags(&self, name: &str) -> Result<BTreeMap<String, String>>;
}

/// Registry document for one package: dist-tags and per-version manifests.
#[derive(Debug, Clone, Default)]
pub struct Packument {
    pub name: String,
    pub dist_tags: BTreeMap<String, String>,
    pub versions: BTreeMap<String, Value>,
}

impl Packument {
    pub fn from_json(value: &Value) -> Result<Self> {
        let Some(obj) = value.as_object() else {
            return Err(Error::upstream("packument is not an object"));
        };
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let dist_tags = obj
            .get("dist-tags")
            .and_then(Value::as_object)
            .map(|tags| {
                tags.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let versions = obj
            .get("versions")
            .and_then(Value::as_object)
            .map(|versions| {
                versions
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            name,
            dist_tags,
            versions,
        })
    }

    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get("latest").map(String::as_str)
    }

    /// Normalized manifest of a published version.
    pub fn manifest(&self, version: &str) -> Result<PackageManifest> {
        let raw = self.versions.get(version).ok_or_else(|| {
            Error::not_found(format!("version {version} of {} not found", self.name))
        })?;
        let mut manifest = PackageManifest::from_json(raw)?;
        if manifest.name.is_empty() {
            manifest.name.clone_from(&self.name);
        }
        if manifest.version.is_empty() {
            manifest.version = version.to_string();
        }
        Ok(manifest)
    }

    /// Resolve `constraint` and return that version's manifest.
    pub fn resolve(&self, constraint: &str) -> Result<PackageManifest> {
        let version = resolve_version(self, constraint)?;
        self.manifest(&version)
    }
}

/// Registry client for fetching package metadata.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::invalid_spec(format!("Invalid registry URL '{base_url}': {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(user_agent())
            .build()
            .map_err(|e| Error::upstream(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the packument for a package.
    pub async fn fetch_packument(&self, name: &str) -> Result<Packument> {
        // Scoped names keep their `@` but encode the slash
        let encoded_name = if name.starts_with('@') {
            name.replace('/', "%2F")
        } else {
            name.to_string()
        };

        let url = self
            .base_url
            .join(&encoded_name)
            .map_err(|e| Error::invalid_spec(format!("Failed to build URL for '{name}': {e}")))?;

        debug!(%url, "fetching packument");
        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found(format!("Package not found: {name}")));
        }

        if !response.status().is_success() {
            return Err(Error::upstream(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        let json: Value = response.json().await?;
        Packument::from_json(&json)
    }
}

/// [`PackageMetadataProvider`] backed by the npm registry.
///
/// Packuments are cached for the life of the provider, and concurrent
/// misses on one name share a single fetch. Must not be called from inside
/// an async task; it blocks on the runtime it was created with.
pub struct RegistryMetadataProvider {
    client: RegistryClient,
    runtime: Handle,
    packuments: RwLock<HashMap<String, Arc<Packument>>>,
    fetches: KeyedMutex,
}

impl RegistryMetadataProvider {
    #[must_use]
    pub fn new(client: RegistryClient, runtime: Handle) -> Self {
        Self {
            client,
            runtime,
            packuments: RwLock::new(HashMap::new()),
            fetches: KeyedMutex::new(),
        }
    }

    fn cached(&self, name: &str) -> Option<Arc<Packument>> {
        self.packuments
            .read()
            .ok()
            .and_then(|cache| cache.get(name).cloned())
    }

    fn packument(&self, name: &str) -> Result<Arc<Packument>> {
        if let Some(hit) = self.cached(name) {
            return Ok(hit);
        }

        self.fetches.with_lock(name, || {
            // Another caller may have fetched it while we waited
            if let Some(hit) = self.cached(name) {
                return Ok(hit);
            }
            let fetched = Arc::new(self.runtime.block_on(self.client.fetch_packument(name))?);
            if let Ok(mut cache) = self.packuments.write() {
                cache.insert(name.to_string(), Arc::clone(&fetched));
            }
            Ok(fetched)
        })
    }
}

impl PackageMetadataProvider for RegistryMetadataProvider {
    fn manifest(&self, name: &str, constraint: &str) -> Result<PackageManifest> {
        self.packument(name)?.resolve(constraint)
    }

    fn dist_tags(&self, name: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.packument(name)?.dist_tags.clone())
    }
}

/// In-memory registry with a lookup counter.
#[derive(Default)]
pub struct MemoryRegistry {
    packuments: RwLock<HashMap<String, Packument>>,
    lookups: AtomicUsize,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a version from its raw `package.json`.
    ///
    /// `dist-tags.latest` tracks the highest published version.
    pub fn publish(&self, manifest: Value) -> Result<()> {
        let name = manifest
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_spec("manifest has no name"))?
            .to_string();
        let version = manifest
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_spec("manifest has no version"))?
            .to_string();

        let mut packuments = self
            .packuments
            .write()
            .map_err(|_| Error::conflict("registry lock poisoned"))?;
        let packument = packuments.entry(name.clone()).or_insert_with(|| Packument {
            name,
            ..Default::default()
        });
        packument.versions.insert(version, manifest);

        let latest = packument
            .versions
            .keys()
            .filter_map(|v| semver::Version::parse(v).ok())
            .filter(|v| v.pre.is_empty())
            .max();
        if let Some(latest) = latest {
            packument
                .dist_tags
                .insert("latest".to_string(), latest.to_string());
        }
        Ok(())
    }

    /// Point a dist-tag at a version.
    pub fn tag(&self, name: &str, tag: &str, version: &str) -> Result<()> {
        let mut packuments = self
            .packuments
            .write()
            .map_err(|_| Error::conflict("registry lock poisoned"))?;
        let packument = packuments
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Package not found: {name}")))?;
        packument
            .dist_tags
            .insert(tag.to_string(), version.to_string());
        Ok(())
    }

    /// Number of `manifest` lookups served.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl PackageMetadataProvider for MemoryRegistry {
    fn manifest(&self, name: &str, constraint: &str) -> Result<PackageManifest> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let packuments = self
            .packuments
            .read()
            .map_err(|_| Error::conflict("registry lock poisoned"))?;
        packuments
            .get(name)
            .ok_or_else(|| Error::not_found(format!("Package not found: {name}")))?
            .resolve(constraint)
    }

    fn dist_tags(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let packuments = self
            .packuments
            .read()
            .map_err(|_| Error::conflict("registry lock poisoned"))?;
        packuments
            .get(name)
            .map(|p| p.dist_tags.clone())
            .ok_or_else(|| Error::not_found(format!("Package not found: {name}")))
    }
}
