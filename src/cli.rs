//! # Command Line Interface
//!
//! `routeplane serve` runs the xDS server, optionally seeded from manifest
//! files. `routeplane validate` builds the manifests once and prints what
//! would be served.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::dag::{self, Dag, InsecureRoute, ObjectSet};
use crate::objects::{manifest, KubeObject};
use crate::xds::{self, EventHandler, ResourceCache};
use crate::Result;

#[derive(Parser)]
#[command(name = "routeplane")]
#[command(about = "Routeplane Envoy control plane")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the xDS server
    Serve {
        /// Manifest files loaded before accepting connections
        #[arg(short, long = "manifest")]
        manifests: Vec<PathBuf>,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Parse manifests, build once and print the resulting virtual hosts and clusters
    Validate {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// Flags that win over `ROUTEPLANE_*` environment settings
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// xDS bind host
    #[arg(long)]
    pub xds_host: Option<String>,

    /// xDS bind port
    #[arg(long)]
    pub xds_port: Option<u16>,

    /// Accepted ingress class
    #[arg(long)]
    pub ingress_class: Option<String>,

    /// Namespaces allowed to hold HostRoute roots (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub root_namespaces: Vec<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(host) = &self.xds_host {
            config.xds.host = host.clone();
        }
        if let Some(port) = self.xds_port {
            config.xds.port = port;
        }
        if let Some(class) = &self.ingress_class {
            config.translator.ingress_class = Some(class.clone());
        }
        if !self.root_namespaces.is_empty() {
            config.translator.root_namespaces = self.root_namespaces.clone();
        }
        config.validate()
    }
}

/// Load every manifest in order.
pub fn load_manifests(paths: &[PathBuf]) -> Result<Vec<KubeObject>> {
    let mut objects = Vec::new();
    for path in paths {
        let loaded = manifest::load_file(path)?;
        info!(path = %path.display(), objects = loaded.len(), "Loaded manifest");
        objects.extend(loaded);
    }
    Ok(objects)
}

/// Seed the cache from `manifests` and serve until Ctrl+C.
pub async fn run_serve(manifests: &[PathBuf], config: AppConfig) -> Result<()> {
    let cache = Arc::new(ResourceCache::new());
    let handler = EventHandler::from_config(Arc::clone(&cache), &config);

    for object in load_manifests(manifests)? {
        handler.on_add(object).await;
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    xds::serve(cache, &config.xds, async move { shutdown.cancelled().await }).await
}

/// Build the manifests once and describe the result.
pub fn run_validate(paths: &[PathBuf], config: &AppConfig, format: OutputFormat) -> Result<String> {
    let objects = ObjectSet::from_objects(load_manifests(paths)?);
    let dag = dag::build(&objects, &config.translator);
    let summary = DagSummary::from(&dag);

    Ok(match format {
        OutputFormat::Text => summary.to_string(),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&summary)?;
            json.push('\n');
            json
        }
        OutputFormat::Yaml => serde_yaml::to_string(&summary)?,
    })
}

/// What a built graph would serve, in a printable shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DagSummary {
    pub virtual_hosts: Vec<VirtualHostSummary>,
    pub clusters: Vec<ClusterSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualHostSummary {
    pub fqdn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSummary>,
    /// Routes as served on the plaintext listener
    pub routes: Vec<RouteSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TlsSummary {
    pub secret: String,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub prefix: String,
    pub https_redirect: bool,
    pub clusters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub name: String,
    pub eds_service_name: String,
}

impl From<&Dag> for DagSummary {
    fn from(dag: &Dag) -> Self {
        let virtual_hosts = dag
            .virtual_hosts
            .values()
            .map(|vhost| VirtualHostSummary {
                fqdn: vhost.fqdn.clone(),
                tls: vhost.tls.as_ref().map(|binding| TlsSummary {
                    secret: binding.secret.to_string(),
                    valid: vhost.keypair().is_some(),
                }),
                routes: vhost
                    .insecure_routes()
                    .into_iter()
                    .map(|route| match route {
                        InsecureRoute::HttpsRedirect(r) => RouteSummary {
                            prefix: r.prefix.clone(),
                            https_redirect: true,
                            clusters: Vec::new(),
                        },
                        InsecureRoute::Forward(r) => RouteSummary {
                            prefix: r.prefix.clone(),
                            https_redirect: false,
                            clusters: r.clusters.iter().map(|c| c.name.clone()).collect(),
                        },
                    })
                    .collect(),
            })
            .collect();

        let clusters = dag
            .clusters
            .values()
            .map(|cluster| ClusterSummary { name: cluster.name.clone(), eds_service_name: cluster.eds_service_name() })
            .collect();

        Self { virtual_hosts, clusters }
    }
}

/// Human readable listing of virtual hosts, their routes and the clusters.
impl std::fmt::Display for DagSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "virtual hosts: {}", self.virtual_hosts.len())?;
        for vhost in &self.virtual_hosts {
            let tls = match &vhost.tls {
                Some(tls) if tls.valid => format!(" [tls {}]", tls.secret),
                Some(tls) => format!(" [tls {} invalid]", tls.secret),
                None => String::new(),
            };
            writeln!(f, "  {}{}", vhost.fqdn, tls)?;

            for route in &vhost.routes {
                let target =
                    if route.https_redirect { "https redirect".to_string() } else { route.clusters.join(", ") };
                writeln!(f, "    {} -> {}", route.prefix, target)?;
            }
        }

        writeln!(f, "clusters: {}", self.clusters.len())?;
        for cluster in &self.clusters {
            writeln!(f, "  {} (endpoints {})", cluster.name, cluster.eds_service_name)?;
        }
        Ok(())
    }
}

/// Text summary of `dag`.
pub fn summarize(dag: &Dag) -> String {
    DagSummary::from(dag).to_string()
}
