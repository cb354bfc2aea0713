use serde::{Deserialize, Deserializer};

/// Local or remote bind address of a tunnel or pipe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Listener {
    #[serde(rename = "IP", default)]
    pub ip: String,
    #[serde(default)]
    pub port: u16,
}

impl std::fmt::Display for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Forwarded destination of a tunnel or pipe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Endpoint {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A record type exposed by one of the collection endpoints.
pub trait Resource: std::fmt::Debug + Clone + Send + Sync + 'static {
    /// Collection endpoint, relative to the API base (`tuns/`, `pipes/`).
    const COLLECTION: &'static str;
    /// Singular noun used in messages.
    const NOUN: &'static str;
    /// Whether the creation form carries the local-listener flag.
    const HAS_DIRECTION: bool;

    fn id(&self) -> u64;
    fn is_stoppable(&self) -> bool;
    fn listener(&self) -> Option<&Listener>;
    fn endpoint(&self) -> Option<&Endpoint>;
    fn clients_count(&self) -> u64;
    fn throughput(&self) -> &str;
}

/// An SSH-forwarded connection between a listener and an endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tunnel {
    #[serde(deserialize_with = "numeric_id")]
    pub id: u64,
    #[serde(default)]
    pub listener: Option<Listener>,
    #[serde(default)]
    pub is_listener_local: bool,
    #[serde(default)]
    pub endpoint: Option<Endpoint>,
    #[serde(default)]
    pub is_stoppable: bool,
    #[serde(default)]
    pub clients_count: u64,
    #[serde(default)]
    pub throughput_string: String,
}

impl Resource for Tunnel {
    const COLLECTION: &'static str = "tuns/";
    const NOUN: &'static str = "tunnel";
    const HAS_DIRECTION: bool = true;

    fn id(&self) -> u64 {
        self.id
    }
    fn is_stoppable(&self) -> bool {
        self.is_stoppable
    }
    fn listener(&self) -> Option<&Listener> {
        self.listener.as_ref()
    }
    fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }
    fn clients_count(&self) -> u64 {
        self.clients_count
    }
    fn throughput(&self) -> &str {
        &self.throughput_string
    }
}

/// A plain relay from a local listener to a remote endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pipe {
    #[serde(deserialize_with = "numeric_id")]
    pub id: u64,
    #[serde(default)]
    pub listener: Option<Listener>,
    #[serde(default)]
    pub endpoint: Option<Endpoint>,
    #[serde(default)]
    pub is_stoppable: bool,
    #[serde(default)]
    pub clients_count: u64,
    #[serde(default)]
    pub throughput_string: String,
}

impl Resource for Pipe {
    const COLLECTION: &'static str = "pipes/";
    const NOUN: &'static str = "pipe";
    const HAS_DIRECTION: bool = false;

    fn id(&self) -> u64 {
        self.id
    }
    fn is_stoppable(&self) -> bool {
        self.is_stoppable
    }
    fn listener(&self) -> Option<&Listener> {
        self.listener.as_ref()
    }
    fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }
    fn clients_count(&self) -> u64 {
        self.clients_count
    }
    fn throughput(&self) -> &str {
        &self.throughput_string
    }
}

/// SSH client connection details reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceInfo {
    #[serde(rename = "SshClientURI")]
    pub ssh_client_uri: String,
    pub ssh_client_connection_status: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub jump_hosts: Vec<String>,
}

/// Aggregate counters for the whole service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceStats {
    pub count_tunnels: u64,
    pub count_tunnels_clients: u64,
    pub total_tunnel_throughput_string: String,
    pub count_pipes: u64,
    pub count_pipes_clients: u64,
    pub total_pipe_throughput_string: String,
    /// Worker count (goroutines on the reference server).
    #[serde(rename = "NumGoroutine")]
    pub workers: u64,
    /// Allocated memory in bytes.
    pub mem_total: u64,
}

/// Accept an id sent either as a JSON number or as a numeric string.
fn numeric_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Num(n) => Ok(n),
        RawId::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("non-numeric id '{}'", s))),
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
