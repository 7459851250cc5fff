//! Request-facing entry point tying path resolution to the build queue.

use super::task::{BuildEnv, BuildTask};
use super::{BuildMeta, BuildRequest, Bundler, PackageInstaller};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::esm::{
    canonicalize_build_args, BuildArgs, DepGraphWalker, EsmPath, PathResolver, Target,
};
use crate::npm::{GitRefLister, PackageMetadataProvider};
use crate::queue::{BuildQueue, QueueStats, Waiter};
use crate::resolver::PrewarmSink;
use crate::sync::KeyedMutex;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Client id recorded for builds nobody asked for yet.
const PREWARM_CLIENT: &str = "prewarm";

/// Resolves request paths and runs their builds.
pub struct BuildService {
    env: Arc<BuildEnv>,
    queue: BuildQueue<BuildTask>,
    paths: PathResolver,
}

impl BuildService {
    pub fn new(
        config: Config,
        metadata: Arc<dyn PackageMetadataProvider>,
        git: Arc<dyn GitRefLister>,
        installer: Arc<dyn PackageInstaller>,
        bundler: Arc<dyn Bundler>,
    ) -> Result<Arc<Self>> {
        let walker = DepGraphWalker::new(
            Arc::clone(&metadata),
            config.dep_walk_concurrency,
            config.dep_walk_max_depth,
        )?;
        let queue = BuildQueue::new(config.build_concurrency, config.completed_cache_capacity);
        let paths = PathResolver::new(Arc::clone(&metadata), Arc::clone(&git));

        Ok(Arc::new_cyclic(|service: &Weak<Self>| {
            let prewarm: Weak<dyn PrewarmSink> = service.clone();
            Self {
                env: Arc::new(BuildEnv {
                    config,
                    metadata,
                    git,
                    installer,
                    bundler,
                    walker,
                    installs: KeyedMutex::new(),
                    prewarm,
                }),
                queue,
                paths,
            }
        }))
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.env.config
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Turn a request path into a canonical build.
    ///
    /// The target comes from the path, then the user agent, then the
    /// default. Blocks on registry and git lookups.
    pub fn canonicalize(&self, pathname: &str, user_agent: Option<&str>) -> Result<BuildRequest> {
        let resolved = self.paths.resolve(pathname)?;
        let target = resolved
            .target
            .or_else(|| user_agent.map(Target::from_user_agent))
            .unwrap_or(Target::DEFAULT);
        let args = self.canonicalize_args(&resolved.esm, &resolved.args)?;
        Ok(BuildRequest {
            esm: resolved.esm,
            args,
            target,
            dev: resolved.dev,
        })
    }

    /// Drop overrides that cannot affect the build of `esm`.
    pub fn canonicalize_args(&self, esm: &EsmPath, args: &BuildArgs) -> Result<BuildArgs> {
        canonicalize_build_args(args, esm, self.env.metadata.as_ref(), &self.env.walker)
    }

    /// Queue `request`, or join the build already running for it.
    pub fn enqueue(&self, request: BuildRequest, client_id: &str) -> Waiter<BuildMeta> {
        self.queue.add(
            BuildTask {
                env: Arc::clone(&self.env),
                request,
            },
            client_id,
        )
    }

    /// Resolve `pathname` and wait for its build, up to the configured
    /// timeout.
    pub async fn build(
        self: &Arc<Self>,
        pathname: &str,
        user_agent: Option<&str>,
        client_id: &str,
    ) -> Result<Arc<BuildMeta>> {
        let service = Arc::clone(self);
        let pathname = pathname.to_string();
        let user_agent = user_agent.map(str::to_string);
        let request = tokio::task::spawn_blocking(move || {
            service.canonicalize(&pathname, user_agent.as_deref())
        })
        .await
        .map_err(|e| Error::upstream(format!("resolver task failed: {e}")))??;

        debug!(path = %request.path(), client = client_id, "build requested");
        self.enqueue(request, client_id)
            .wait(self.env.config.build_wait_timeout())
            .await
    }
}

impl PrewarmSink for BuildService {
    fn prewarm(&self, esm: EsmPath, args: BuildArgs, target: Target, dev: bool) {
        let request = BuildRequest {
            esm,
            args,
            target,
            dev,
        };
        // Nobody waits on the result; it lands in the cache
        drop(self.enqueue(request, PREWARM_CLIENT));
    }
}
