// RelayLab: Topology Compilation and Latency Measurement for Emulated Relay Meshes
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Ordered startup of the processes of an emulated network.
//!
//! Processes start in stages: the control API, then all relays, then all publishers, and finally
//! all subscribers. A stage only starts once every process of the previous stage passed its
//! readiness probe.

use std::{
    collections::HashMap,
    fmt,
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{net::UdpSocket, process::Child, time::Instant};

use crate::{
    addressing::AddressPlan,
    topology::{HopRole, NodeId, Topology},
};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Cannot spawn {binary} on {host}: {source}")]
    Spawn {
        host: String,
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{host} did not become ready within {timeout:?} (waiting for {probe})")]
    NotReady {
        host: String,
        probe: ReadinessProbe,
        timeout: Duration,
    },
    #[error("Readiness check of {host} failed: {reason}")]
    Check { host: String, reason: String },
    #[error("No address is allocated for {0}")]
    MissingAddress(String),
    #[error("Cannot create the HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Settings of the processes running in the emulated network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub relay_binary: String,
    pub publisher_binary: String,
    pub subscriber_binary: String,
    pub api_binary: String,
    /// Port on which every relay listens, on its identity address.
    pub relay_port: u16,
    pub tls_cert: String,
    pub tls_key: String,
    /// Verify TLS certificates. Disabled for self-signed development certificates.
    pub tls_verify: bool,
    /// Value of `RUST_LOG` for relays.
    pub relay_log_level: String,
    /// Value of `RUST_LOG` for publishers and subscribers.
    pub client_log_level: String,
    /// Maximum time to wait for a single process to become ready.
    #[serde(with = "duration_millis")]
    pub ready_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    /// Maximum time a single readiness check may take.
    #[serde(with = "duration_millis")]
    pub check_timeout: Duration,
    /// Command prefix that runs a process on a host. `{host}` is replaced by the host name.
    pub host_prefix: Vec<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            relay_binary: "./target/debug/moq-relay".to_string(),
            publisher_binary: "./target/debug/moq-pub".to_string(),
            subscriber_binary: "./target/debug/moq-sub".to_string(),
            api_binary: "./dev/api".to_string(),
            relay_port: 4443,
            tls_cert: "./dev/localhost.crt".to_string(),
            tls_key: "./dev/localhost.key".to_string(),
            tls_verify: false,
            relay_log_level: "debug".to_string(),
            client_log_level: "info".to_string(),
            ready_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
            check_timeout: Duration::from_millis(500),
            host_prefix: ["ip", "netns", "exec", "{host}"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Condition under which a started process counts as ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReadinessProbe {
    /// The control API answers HTTP requests on `url`.
    ApiReachable { url: String },
    /// The relay accepts connections on `addr`.
    RelayListening { addr: SocketAddrV4 },
    /// The control API knows an origin for `track`, registered by the relay with the given id
    /// (the last octet of its identity address).
    TrackAnnounced {
        api: String,
        relay_id: u8,
        track: String,
    },
    /// Ready as soon as it is spawned.
    Started,
}

impl fmt::Display for ReadinessProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiReachable { url } => write!(f, "control API at {url}"),
            Self::RelayListening { addr } => write!(f, "relay listening on {addr}"),
            Self::TrackAnnounced { track, .. } => write!(f, "announcement of {track}"),
            Self::Started => write!(f, "process start"),
        }
    }
}

/// A process to run on a host of the emulated network. Never a shell string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub node: NodeId,
    pub host: String,
    pub binary: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub probe: ReadinessProbe,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageKind {
    Control,
    Relays,
    Publishers,
    Subscribers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchStage {
    pub kind: StageKind,
    pub processes: Vec<ProcessSpec>,
}

/// All processes of the network, in startup order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchPlan {
    pub stages: Vec<LaunchStage>,
}

impl LaunchPlan {
    pub fn build(
        topo: &Topology,
        plan: &AddressPlan,
        config: &LaunchConfig,
    ) -> Result<Self, LaunchError> {
        let control = plan.control();
        let api_url = format!("http://{}", control.control_addr);
        let identity = |r: NodeId| {
            plan.try_identity(r)
                .ok_or_else(|| LaunchError::MissingAddress(topo.name(r).to_string()))
        };
        let relay_url = |addr: Ipv4Addr| format!("https://{addr}:{}", config.relay_port);
        let insecure = (!config.tls_verify).then(|| "--tls-disable-verify".to_string());

        let api = ProcessSpec {
            node: control.control,
            host: topo.name(control.control).to_string(),
            binary: config.api_binary.clone(),
            args: Vec::new(),
            env: vec![("REDIS".to_string(), control.uplink_peer_addr.to_string())],
            probe: ReadinessProbe::ApiReachable {
                url: api_url.clone(),
            },
        };

        let relays = topo
            .relay_ids()
            .map(|r| {
                let addr = identity(r)?;
                let bind = SocketAddrV4::new(addr, config.relay_port);
                let mut args = vec![
                    "--bind".to_string(),
                    bind.to_string(),
                    "--api".to_string(),
                    api_url.clone(),
                    "--node".to_string(),
                    relay_url(addr),
                    "--tls-cert".to_string(),
                    config.tls_cert.clone(),
                    "--tls-key".to_string(),
                    config.tls_key.clone(),
                ];
                args.extend(insecure.clone());
                args.push("--dev".to_string());
                Ok(ProcessSpec {
                    node: r,
                    host: topo.name(r).to_string(),
                    binary: config.relay_binary.clone(),
                    args,
                    env: vec![
                        ("RUST_LOG".to_string(), config.relay_log_level.clone()),
                        ("RUST_BACKTRACE".to_string(), "0".to_string()),
                    ],
                    probe: ReadinessProbe::RelayListening { addr: bind },
                })
            })
            .collect::<Result<Vec<_>, LaunchError>>()?;

        let clients = |role: HopRole| {
            topo.attachments()
                .iter()
                .filter(|a| a.role == role)
                .map(|a| {
                    let relay_addr = identity(a.relay)?;
                    let (binary, probe) = match role {
                        HopRole::FirstHop => (
                            config.publisher_binary.clone(),
                            ReadinessProbe::TrackAnnounced {
                                api: api_url.clone(),
                                relay_id: relay_addr.octets()[3],
                                track: a.track.clone(),
                            },
                        ),
                        HopRole::LastHop => {
                            (config.subscriber_binary.clone(), ReadinessProbe::Started)
                        }
                    };
                    let mut args = vec![
                        "--name".to_string(),
                        a.track.clone(),
                        relay_url(relay_addr),
                    ];
                    args.extend(insecure.clone());
                    Ok(ProcessSpec {
                        node: a.host,
                        host: topo.name(a.host).to_string(),
                        binary,
                        args,
                        env: vec![("RUST_LOG".to_string(), config.client_log_level.clone())],
                        probe,
                    })
                })
                .collect::<Result<Vec<_>, LaunchError>>()
        };

        Ok(Self {
            stages: vec![
                LaunchStage {
                    kind: StageKind::Control,
                    processes: vec![api],
                },
                LaunchStage {
                    kind: StageKind::Relays,
                    processes: relays,
                },
                LaunchStage {
                    kind: StageKind::Publishers,
                    processes: clients(HopRole::FirstHop)?,
                },
                LaunchStage {
                    kind: StageKind::Subscribers,
                    processes: clients(HopRole::LastHop)?,
                },
            ],
        })
    }

    pub fn processes(&self) -> impl Iterator<Item = &ProcessSpec> {
        self.stages.iter().flat_map(|s| s.processes.iter())
    }
}

/// Starts processes on the hosts of the emulated network.
#[async_trait::async_trait]
pub trait ProcessSupervisor: Send {
    async fn spawn(&mut self, spec: &ProcessSpec) -> Result<(), LaunchError>;
}

/// Evaluates readiness probes.
#[async_trait::async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Check the probe once. Returns `Ok(false)` if the process is not ready yet.
    async fn is_ready(&self, spec: &ProcessSpec) -> Result<bool, LaunchError>;
}

/// Start all stages in order. Every stage is spawned completely, and then every probe of the stage
/// is polled until it succeeds or `config.ready_timeout` expires.
pub async fn start<S, C>(
    plan: &LaunchPlan,
    supervisor: &mut S,
    check: &C,
    config: &LaunchConfig,
) -> Result<(), LaunchError>
where
    S: ProcessSupervisor + ?Sized,
    C: ReadinessCheck + ?Sized,
{
    for stage in plan.stages.iter() {
        log::info!(
            "Starting stage {} ({} processes)",
            stage.kind,
            stage.processes.len()
        );
        for spec in stage.processes.iter() {
            log::debug!("[{}] {} {}", spec.host, spec.binary, spec.args.join(" "));
            supervisor.spawn(spec).await?;
        }
        for spec in stage.processes.iter() {
            wait_ready(spec, check, config).await?;
        }
    }
    Ok(())
}

async fn wait_ready<C>(spec: &ProcessSpec, check: &C, config: &LaunchConfig) -> Result<(), LaunchError>
where
    C: ReadinessCheck + ?Sized,
{
    if spec.probe == ReadinessProbe::Started {
        return Ok(());
    }
    let deadline = Instant::now() + config.ready_timeout;
    loop {
        if check.is_ready(spec).await? {
            log::debug!("{} is ready ({})", spec.host, spec.probe);
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(LaunchError::NotReady {
                host: spec.host.clone(),
                probe: spec.probe.clone(),
                timeout: config.ready_timeout,
            });
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}

/// Runs processes as child processes of this program. Each command is prefixed with
/// `host_prefix`, where `{host}` is replaced by the name of the host (e.g.,
/// `["ip", "netns", "exec", "{host}"]`). Children are killed when the supervisor is dropped.
#[derive(Debug, Default)]
pub struct CommandSupervisor {
    host_prefix: Vec<String>,
    children: HashMap<NodeId, Child>,
}

impl CommandSupervisor {
    pub fn new(host_prefix: Vec<String>) -> Self {
        Self {
            host_prefix,
            children: HashMap::new(),
        }
    }

    /// Kill all children.
    pub async fn shutdown(&mut self) {
        for (node, mut child) in self.children.drain() {
            if let Err(e) = child.kill().await {
                log::warn!("Cannot kill the process of node {node}: {e}");
            }
        }
    }

    /// The full command line of a process, including the host prefix.
    pub fn command_line(&self, spec: &ProcessSpec) -> Vec<String> {
        self.host_prefix
            .iter()
            .map(|p| p.replace("{host}", &spec.host))
            .chain(std::iter::once(spec.binary.clone()))
            .chain(spec.args.iter().cloned())
            .collect()
    }
}

#[async_trait::async_trait]
impl ProcessSupervisor for CommandSupervisor {
    async fn spawn(&mut self, spec: &ProcessSpec) -> Result<(), LaunchError> {
        let argv = self.command_line(spec);
        let child = tokio::process::Command::new(&argv[0])
            .args(&argv[1..])
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                host: spec.host.clone(),
                binary: spec.binary.clone(),
                source,
            })?;
        self.children.insert(spec.node, child);
        Ok(())
    }
}

/// Evaluates readiness probes over the network. The control API is queried over HTTP. Relays
/// serve QUIC, so a relay counts as listening once a datagram to its port is no longer refused.
#[derive(Debug, Clone)]
pub struct NetworkReadiness {
    client: reqwest::Client,
    timeout: Duration,
}

impl NetworkReadiness {
    /// Create a checker whose individual checks give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, LaunchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LaunchError::Client)?;
        Ok(Self { client, timeout })
    }

    /// Status of a GET request, or `None` if no response arrived.
    async fn status(&self, url: &str) -> Option<reqwest::StatusCode> {
        match self.client.get(url).send().await {
            Ok(resp) => Some(resp.status()),
            Err(e) => {
                log::trace!("GET {url}: {e}");
                None
            }
        }
    }

    async fn udp_port_open(&self, addr: SocketAddrV4) -> std::io::Result<bool> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect(addr).await?;
        match socket.send(&[0]).await {
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => return Ok(false),
            r => r?,
        };
        let mut buf = [0u8; 64];
        match tokio::time::timeout(self.timeout, socket.recv(&mut buf)).await {
            // silence means nobody rejected the datagram
            Err(_) | Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => Ok(false),
            Ok(Err(e)) => Err(e),
        }
    }
}

/// URL under which the control API stores the origin of `track` for a relay.
pub fn origin_url(api: &str, relay_id: u8, track: &str) -> String {
    format!("{}/origin/{relay_id}/{track}", api.trim_end_matches('/'))
}

#[async_trait::async_trait]
impl ReadinessCheck for NetworkReadiness {
    async fn is_ready(&self, spec: &ProcessSpec) -> Result<bool, LaunchError> {
        match &spec.probe {
            ReadinessProbe::ApiReachable { url } => Ok(self.status(url).await.is_some()),
            ReadinessProbe::TrackAnnounced {
                api,
                relay_id,
                track,
            } => Ok(self
                .status(&origin_url(api, *relay_id, track))
                .await
                .is_some_and(|s| s.is_success())),
            ReadinessProbe::RelayListening { addr } => {
                self.udp_port_open(*addr)
                    .await
                    .map_err(|e| LaunchError::Check {
                        host: spec.host.clone(),
                        reason: e.to_string(),
                    })
            }
            ReadinessProbe::Started => Ok(true),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::addressing::allocate;

    fn setup() -> (Topology, AddressPlan) {
        let t = Topology::load(
            &serde_yaml::from_str(
                "{nodes: {number: 2}, first_hop_relay: [{relay: 1, track: bbb}], last_hop_relay: [{relay: 2, track: bbb}]}",
            )
            .unwrap(),
        )
        .unwrap();
        let p = allocate(&t).unwrap();
        (t, p)
    }

    #[test]
    fn relay_arguments() {
        let (t, p) = setup();
        let plan = LaunchPlan::build(&t, &p, &LaunchConfig::default()).unwrap();
        let r1 = &plan.stages[1].processes[0];
        assert_eq!(
            r1.args,
            vec![
                "--bind",
                "10.3.0.1:4443",
                "--api",
                "http://10.1.1.1",
                "--node",
                "https://10.3.0.1:4443",
                "--tls-cert",
                "./dev/localhost.crt",
                "--tls-key",
                "./dev/localhost.key",
                "--tls-disable-verify",
                "--dev"
            ]
        );
        let api = &plan.stages[0].processes[0];
        assert_eq!(api.env, vec![("REDIS".to_string(), "10.1.0.99".to_string())]);
        let sub = &plan.stages[3].processes[0];
        assert_eq!(sub.host, "sub1");
        assert_eq!(
            sub.args,
            vec!["--name", "bbb", "https://10.3.0.2:4443", "--tls-disable-verify"]
        );
    }

    #[derive(Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl ProcessSupervisor for Recorder {
        async fn spawn(&mut self, spec: &ProcessSpec) -> Result<(), LaunchError> {
            self.events.lock().unwrap().push(format!("spawn {}", spec.host));
            Ok(())
        }
    }

    /// Every process becomes ready on the second poll.
    struct SecondPoll {
        polls: Mutex<HashMap<String, usize>>,
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl ReadinessCheck for SecondPoll {
        async fn is_ready(&self, spec: &ProcessSpec) -> Result<bool, LaunchError> {
            let mut polls = self.polls.lock().unwrap();
            let n = polls.entry(spec.host.clone()).or_default();
            *n += 1;
            if *n >= 2 {
                self.events.lock().unwrap().push(format!("ready {}", spec.host));
            }
            Ok(*n >= 2)
        }
    }

    struct Never;

    #[async_trait::async_trait]
    impl ReadinessCheck for Never {
        async fn is_ready(&self, _: &ProcessSpec) -> Result<bool, LaunchError> {
            Ok(false)
        }
    }

    fn fast() -> LaunchConfig {
        LaunchConfig {
            ready_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn stages_wait_for_readiness() {
        let (t, p) = setup();
        let plan = LaunchPlan::build(&t, &p, &fast()).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut sup = Recorder {
            events: events.clone(),
        };
        let check = SecondPoll {
            polls: Default::default(),
            events: events.clone(),
        };
        start(&plan, &mut sup, &check, &fast()).await.unwrap();
        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "spawn api",
                "ready api",
                "spawn r1",
                "spawn r2",
                "ready r1",
                "ready r2",
                "spawn pub1",
                "ready pub1",
                "spawn sub1",
            ]
        );
    }

    #[tokio::test]
    async fn timeout_stops_startup() {
        let (t, p) = setup();
        let plan = LaunchPlan::build(&t, &p, &fast()).unwrap();
        let mut sup = Recorder::default();
        let events = sup.events.clone();
        match start(&plan, &mut sup, &Never, &fast()).await {
            Err(LaunchError::NotReady { host, .. }) => assert_eq!(host, "api"),
            x => panic!("expected a timeout, got {x:?}"),
        }
        assert_eq!(events.lock().unwrap().clone(), vec!["spawn api"]);
    }

    #[test]
    fn publisher_waits_for_origin_of_its_relay() {
        let (t, p) = setup();
        let plan = LaunchPlan::build(&t, &p, &LaunchConfig::default()).unwrap();
        let publisher = &plan.stages[2].processes[0];
        assert_eq!(
            publisher.probe,
            ReadinessProbe::TrackAnnounced {
                api: "http://10.1.1.1".to_string(),
                relay_id: 1,
                track: "bbb".to_string(),
            }
        );
        assert_eq!(
            origin_url("http://10.1.1.1/", 1, "bbb"),
            "http://10.1.1.1/origin/1/bbb"
        );
    }

    /// Answer every HTTP request with 200 if its path is `found`, and with 404 otherwise.
    async fn http_server(found: &'static str) -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let path = request.split_whitespace().nth(1).unwrap_or("");
                    let response = if path == found {
                        "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}"
                    } else {
                        "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    };
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        addr
    }

    fn spec_with(probe: ReadinessProbe) -> ProcessSpec {
        ProcessSpec {
            node: NodeId(0),
            host: "h".to_string(),
            binary: String::new(),
            args: Vec::new(),
            env: Vec::new(),
            probe,
        }
    }

    /// An address on which nothing listens.
    fn closed_tcp_addr() -> std::net::SocketAddr {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap()
    }

    #[tokio::test]
    async fn api_reachable() {
        let check = NetworkReadiness::new(Duration::from_secs(2)).unwrap();
        let addr = http_server("/origin/7/bbb").await;
        let up = spec_with(ReadinessProbe::ApiReachable {
            url: format!("http://{addr}"),
        });
        // any answer counts, even a 404
        assert!(check.is_ready(&up).await.unwrap());

        let down = spec_with(ReadinessProbe::ApiReachable {
            url: format!("http://{}", closed_tcp_addr()),
        });
        assert!(!check.is_ready(&down).await.unwrap());
    }

    #[tokio::test]
    async fn track_announced() {
        let check = NetworkReadiness::new(Duration::from_secs(2)).unwrap();
        let addr = http_server("/origin/7/bbb").await;
        let track = |relay_id, track: &str| {
            spec_with(ReadinessProbe::TrackAnnounced {
                api: format!("http://{addr}"),
                relay_id,
                track: track.to_string(),
            })
        };
        assert!(check.is_ready(&track(7, "bbb")).await.unwrap());
        assert!(!check.is_ready(&track(7, "other")).await.unwrap());
        assert!(!check.is_ready(&track(8, "bbb")).await.unwrap());
    }

    #[tokio::test]
    async fn relay_listening() {
        let check = NetworkReadiness::new(Duration::from_millis(200)).unwrap();
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = match relay.local_addr().unwrap() {
            std::net::SocketAddr::V4(a) => a,
            a => panic!("unexpected address {a}"),
        };
        let spec = spec_with(ReadinessProbe::RelayListening { addr });
        assert!(check.is_ready(&spec).await.unwrap());

        drop(relay);
        assert!(!check.is_ready(&spec).await.unwrap());
    }

    #[tokio::test]
    async fn command_supervisor_spawns_and_kills() {
        let mut sup = CommandSupervisor::new(Vec::new());
        let mut spec = spec_with(ReadinessProbe::Started);
        spec.binary = "sleep".to_string();
        spec.args = vec!["30".to_string()];
        sup.spawn(&spec).await.unwrap();
        assert_eq!(sup.children.len(), 1);
        sup.shutdown().await;
        assert!(sup.children.is_empty());

        spec.binary = "./does-not-exist".to_string();
        assert!(matches!(
            sup.spawn(&spec).await,
            Err(LaunchError::Spawn { .. })
        ));
    }

    #[test]
    fn host_prefix_is_expanded() {
        let sup = CommandSupervisor::new(LaunchConfig::default().host_prefix);
        let mut spec = spec_with(ReadinessProbe::Started);
        spec.host = "r1".to_string();
        spec.binary = "moq-relay".to_string();
        spec.args = vec!["--dev".to_string()];
        assert_eq!(
            sup.command_line(&spec),
            vec!["ip", "netns", "exec", "r1", "moq-relay", "--dev"]
        );
    }
}
