//! The cluster description shared by the controller, login and compute nodes.
//!
//! A [`Config`] is a [`Namespace`] restricted to a known set of top-level
//! properties. There are two ways to get one:
//!
//! - [`Config::new_config`] builds it from the full deployment properties,
//!   inserting every missing property as null and deriving the computed
//!   fields (partition instance types, controller addresses).
//! - [`Config::load_config`] reads a file previously written by
//!   [`Config::save`] and trusts it as-is.
//!
//! Only [`SAVED_PROPS`] are ever written back to disk.

use std::{
  fmt, fs,
  path::Path,
  str::FromStr,
  sync::Arc,
};

use once_cell::sync::OnceCell;

use crate::{
  error::{Error, Result},
  host::{Host, SystemHost},
  namespace::{self, Namespace, Value},
  serialize,
};

/// Properties persisted by [`Config::save`], in file order.
pub const SAVED_PROPS: &[&str] = &[
  "project",
  "zone",
  "cluster_name",
  "external_compute_ips",
  "shared_vpc_host_project",
  "compute_node_prefix",
  "compute_node_service_account",
  "compute_node_scopes",
  "slurm_cmd_path",
  "log_dir",
  "google_app_cred_path",
  "update_node_addrs",
  "network_storage",
  "login_network_storage",
  "instance_types",
];

/// Every property [`Config::new_config`] picks from the deployment properties.
pub const PROPERTIES: &[&str] = &[
  "project",
  "zone",
  "cluster_name",
  "external_compute_ips",
  "shared_vpc_host_project",
  "compute_node_prefix",
  "compute_node_service_account",
  "compute_node_scopes",
  "slurm_cmd_path",
  "log_dir",
  "google_app_cred_path",
  "update_node_addrs",
  "network_storage",
  "login_network_storage",
  "instance_types",
  "munge_key",
  "jwt_key",
  "controller_secondary_disk",
  "suspend_time",
  "login_node_count",
  "cloudsql",
  "partitions",
];

/// Runtime fields of an instance type that never go to disk.
pub const STRIPPED_INSTANCE_TYPE_FIELDS: &[&str] = &["max_node_count", "name", "static_node_count"];

/// `server_ip` placeholder for "the controller of this cluster".
pub const CONTROLLER_SENTINEL: &str = "$controller";

/// The role a node plays in the cluster, read from its instance tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceRole {
  Compute,
  Login,
  Controller,
}

impl InstanceRole {
  pub const ALL: [InstanceRole; 3] = [
    InstanceRole::Compute,
    InstanceRole::Login,
    InstanceRole::Controller,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      InstanceRole::Compute => "compute",
      InstanceRole::Login => "login",
      InstanceRole::Controller => "controller",
    }
  }
}

impl fmt::Display for InstanceRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for InstanceRole {
  type Err = ();

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    InstanceRole::ALL
      .into_iter()
      .find(|role| role.as_str() == s)
      .ok_or(())
  }
}

/// Outcome of resolving [`Config::instance_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleLookup {
  /// The first role tag found on the instance.
  Matched(InstanceRole),
  /// Tags were read but none names a role.
  NoMatch,
  /// Tags could not be fetched or parsed.
  Unavailable,
}

impl RoleLookup {
  pub fn role(&self) -> Option<InstanceRole> {
    match self {
      RoleLookup::Matched(role) => Some(*role),
      RoleLookup::NoMatch | RoleLookup::Unavailable => None,
    }
  }
}

/// Loads config from YAML and holds values in nested namespaces.
#[derive(Clone)]
pub struct Config {
  ns: Namespace,
  host: Arc<dyn Host>,
  instance_type: OnceCell<RoleLookup>,
  hostname: OnceCell<String>,
}

macro_rules! str_props {
  ($($name:ident),* $(,)?) => {
    $(
      pub fn $name(&self) -> Option<&str> {
        self.ns.get_str(stringify!($name))
      }
    )*
  };
}

macro_rules! path_props {
  ($($name:ident),* $(,)?) => {
    $(
      pub fn $name(&self) -> Option<&Path> {
        self.ns.get(stringify!($name)).and_then(Value::as_path)
      }
    )*
  };
}

macro_rules! bool_props {
  ($($name:ident),* $(,)?) => {
    $(
      pub fn $name(&self) -> Option<bool> {
        self.ns.get(stringify!($name)).and_then(Value::as_bool)
      }
    )*
  };
}

macro_rules! seq_props {
  ($($name:ident),* $(,)?) => {
    $(
      pub fn $name(&self) -> Option<&[Value]> {
        self.ns.get(stringify!($name)).and_then(Value::as_seq)
      }
    )*
  };
}

impl Config {
  /// Wraps an already converted namespace without any defaulting.
  pub fn from_namespace(ns: Namespace) -> Self {
    Self {
      ns,
      host: Arc::new(SystemHost::default()),
      instance_type: OnceCell::new(),
      hostname: OnceCell::new(),
    }
  }

  /// Builds a config from the full deployment properties.
  ///
  /// Only [`PROPERTIES`] are taken; each missing one is present afterwards
  /// as null. `properties` itself is not modified.
  pub fn new_config(properties: &Namespace) -> Self {
    let mut ns: Namespace = PROPERTIES
      .iter()
      .map(|&key| (key, properties.get(key).cloned().unwrap_or_default()))
      .collect();

    let cluster_name = ns.get_str("cluster_name").unwrap_or_default().to_string();
    substitute_controller(&mut ns, &format!("{}-controller", cluster_name));

    // Runs after the substitution so the instance types see resolved addresses.
    let instance_types: Option<Namespace> = ns
      .get("partitions")
      .and_then(Value::as_seq)
      .filter(|partitions| !partitions.is_empty())
      .map(|partitions| {
        partitions
          .iter()
          .enumerate()
          .map(|(pid, part)| (format!("{}-compute-{}", cluster_name, pid), part.clone()))
          .collect()
      });
    if let Some(instance_types) = instance_types {
      ns.insert("instance_types", instance_types);
    }

    Self::from_namespace(ns)
  }

  /// Reads a config written by [`Config::save`]. No defaulting or derivation.
  pub fn load_config(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let mut doc: serde_yaml::Value =
      serde_yaml::from_str(&text).map_err(|e| Error::ConfigParse(e.to_string()))?;
    // `<<: *anchor` merge keys are expanded the way YAML loaders conventionally do.
    doc
      .apply_merge()
      .map_err(|e| Error::ConfigParse(e.to_string()))?;
    match doc {
      serde_yaml::Value::Mapping(mapping) => {
        tracing::debug!(path = ?path, "Loaded config");
        Ok(Self::from_namespace(namespace::convert(&mapping)))
      }
      other => Err(Error::ConfigParse(format!(
        "expected a mapping at the top level of {:?}, found {}",
        path,
        yaml_kind(&other)
      ))),
    }
  }

  /// The [`SAVED_PROPS`] subset that [`Config::save`] writes, with runtime
  /// fields stripped from every instance type.
  pub fn saved_view(&self) -> Namespace {
    let mut saved: Namespace = SAVED_PROPS
      .iter()
      .filter_map(|&key| self.ns.get_raw(key).map(|v| (key, v.clone())))
      .collect();

    if let Some(instance_types) = saved.get_mut("instance_types").and_then(Value::as_map_mut) {
      for instance_type in instance_types.values_mut().filter_map(Value::as_map_mut) {
        for field in STRIPPED_INSTANCE_TYPE_FIELDS {
          instance_type.remove(field);
        }
      }
    }
    saved
  }

  /// Writes [`Config::saved_view`] to `path`, replacing any existing content.
  pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let yaml = serialize::to_yaml_string(&self.saved_view())?;
    fs::write(path, yaml).map_err(|source| Error::ConfigWrite {
      path: path.to_path_buf(),
      source,
    })?;
    tracing::debug!(path = ?path, "Saved config");
    Ok(())
  }

  /// Replaces the environment used for the derived fields. Clears their caches.
  pub fn with_host(mut self, host: Arc<dyn Host>) -> Self {
    self.host = host;
    self.instance_type = OnceCell::new();
    self.hostname = OnceCell::new();
    self
  }

  /// Role of this node, from its instance tags. Fetched once per config.
  pub fn instance_type(&self) -> Option<InstanceRole> {
    self.instance_type_lookup().role()
  }

  /// Like [`Config::instance_type`], but tells a failed lookup from a node
  /// without role tags.
  pub fn instance_type_lookup(&self) -> RoleLookup {
    *self
      .instance_type
      .get_or_init(|| lookup_role(self.host.as_ref()))
  }

  /// Hostname of this node. Fetched once per config.
  pub fn hostname(&self) -> &str {
    self.hostname.get_or_init(|| self.host.hostname())
  }

  /// `zone` without its trailing `-<letter>` segment.
  pub fn region(&self) -> Option<&str> {
    self
      .zone()
      .map(|zone| zone.rsplit_once('-').map_or("", |(region, _)| region))
  }

  /// Any field by name. Missing and null fields are `None`.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.ns.get(key)
  }

  pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
    self.ns.get_mut(key)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.ns.contains_key(key)
  }

  pub fn set<K, V>(&mut self, key: K, value: V) -> Option<Value>
  where
    K: Into<String>,
    V: Into<Value>,
  {
    self.ns.insert(key, value)
  }

  pub fn namespace(&self) -> &Namespace {
    &self.ns
  }

  pub fn into_namespace(self) -> Namespace {
    self.ns
  }

  str_props!(
    project,
    zone,
    cluster_name,
    shared_vpc_host_project,
    compute_node_prefix,
    compute_node_service_account,
    munge_key,
    jwt_key,
  );

  path_props!(slurm_cmd_path, log_dir, google_app_cred_path);

  bool_props!(external_compute_ips, update_node_addrs, controller_secondary_disk);

  seq_props!(
    compute_node_scopes,
    network_storage,
    login_network_storage,
    partitions,
  );

  pub fn instance_types(&self) -> Option<&Namespace> {
    self.ns.get("instance_types").and_then(Value::as_map)
  }

  pub fn cloudsql(&self) -> Option<&Namespace> {
    self.ns.get("cloudsql").and_then(Value::as_map)
  }

  /// Seconds of idleness before a node is suspended.
  pub fn suspend_time(&self) -> Option<i64> {
    self.ns.get("suspend_time").and_then(Value::as_i64)
  }

  pub fn login_node_count(&self) -> Option<u64> {
    self.ns.get("login_node_count").and_then(Value::as_u64)
  }
}

impl fmt::Debug for Config {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Config")
      .field("ns", &self.ns)
      .field("instance_type", &self.instance_type.get())
      .field("hostname", &self.hostname.get())
      .finish_non_exhaustive()
  }
}

impl PartialEq for Config {
  fn eq(&self, other: &Self) -> bool {
    self.ns == other.ns
  }
}

impl From<Namespace> for Config {
  fn from(ns: Namespace) -> Self {
    Self::from_namespace(ns)
  }
}

/// Rewrites `$controller` server addresses in the top-level, login and
/// per-partition network storage lists.
fn substitute_controller(ns: &mut Namespace, controller: &str) {
  substitute_in_storage(ns.get_mut("network_storage"), controller);
  substitute_in_storage(ns.get_mut("login_network_storage"), controller);
  if let Some(partitions) = ns.get_mut("partitions").and_then(Value::as_seq_mut) {
    for partition in partitions.iter_mut().filter_map(Value::as_map_mut) {
      substitute_in_storage(partition.get_mut("network_storage"), controller);
    }
  }
}

fn substitute_in_storage(storage: Option<&mut Value>, controller: &str) {
  let Some(entries) = storage.and_then(Value::as_seq_mut) else {
    return;
  };
  for entry in entries.iter_mut().filter_map(Value::as_map_mut) {
    if entry.get_str("server_ip") == Some(CONTROLLER_SENTINEL) {
      entry.insert("server_ip", controller);
    }
  }
}

fn lookup_role(host: &dyn Host) -> RoleLookup {
  let Some(raw) = host.metadata("tags") else {
    return RoleLookup::Unavailable;
  };
  let tags: Option<Vec<String>> = match serde_yaml::from_str(&raw) {
    Ok(tags) => tags,
    Err(e) => {
      tracing::warn!(error = %e, "Instance tags are not a list of strings");
      return RoleLookup::Unavailable;
    }
  };
  tags
    .unwrap_or_default()
    .iter()
    .find_map(|tag| tag.parse::<InstanceRole>().ok())
    .map_or(RoleLookup::NoMatch, RoleLookup::Matched)
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
  match value {
    serde_yaml::Value::Null => "an empty document",
    serde_yaml::Value::Bool(_) => "a boolean",
    serde_yaml::Value::Number(_) => "a number",
    serde_yaml::Value::String(_) => "a string",
    serde_yaml::Value::Sequence(_) => "a sequence",
    serde_yaml::Value::Mapping(_) => "a mapping",
    serde_yaml::Value::Tagged(_) => "a tagged value",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct CountingHost {
    tags: Option<&'static str>,
    metadata_calls: AtomicUsize,
    hostname_calls: AtomicUsize,
  }

  impl CountingHost {
    fn new(tags: Option<&'static str>) -> Arc<Self> {
      Arc::new(Self {
        tags,
        metadata_calls: AtomicUsize::new(0),
        hostname_calls: AtomicUsize::new(0),
      })
    }
  }

  impl Host for CountingHost {
    fn metadata(&self, path: &str) -> Option<String> {
      assert_eq!(path, "tags");
      self.metadata_calls.fetch_add(1, Ordering::SeqCst);
      self.tags.map(str::to_string)
    }

    fn hostname(&self) -> String {
      self.hostname_calls.fetch_add(1, Ordering::SeqCst);
      "demo-compute-0-1".to_string()
    }
  }

  fn props(yaml: &str) -> Namespace {
    let mapping: serde_yaml::Mapping = serde_yaml::from_str(yaml).unwrap();
    namespace::convert(&mapping)
  }

  #[test]
  fn new_config_from_nothing_defaults_every_property() {
    let cfg = Config::new_config(&Namespace::new());
    assert_eq!(cfg.namespace().keys().collect::<Vec<_>>(), PROPERTIES.to_vec());
    for key in PROPERTIES {
      assert!(cfg.contains_key(key), "{} missing", key);
      assert_eq!(cfg.get(key), None);
    }
    assert_eq!(cfg.instance_types(), None);
  }

  #[test]
  fn new_config_drops_unknown_properties_and_keeps_input() {
    let input = props("project: p\nsome_template_var: 1\n");
    let before = input.clone();
    let cfg = Config::new_config(&input);
    assert_eq!(cfg.project(), Some("p"));
    assert!(!cfg.contains_key("some_template_var"));
    assert_eq!(input, before);
  }

  #[test]
  fn partitions_replace_instance_types() {
    let cfg = Config::new_config(&props(
      r#"
cluster_name: foo
instance_types:
  stale: { machine_type: n1-standard-1 }
partitions:
  - { name: debug, machine_type: n1-standard-2 }
  - { name: gpu, machine_type: a2-highgpu-1g }
"#,
    ));

    let types = cfg.instance_types().unwrap();
    assert_eq!(types.keys().collect::<Vec<_>>(), vec!["foo-compute-0", "foo-compute-1"]);
    assert_eq!(types.get("foo-compute-0"), Some(&cfg.partitions().unwrap()[0]));
    assert_eq!(types.get("foo-compute-1"), Some(&cfg.partitions().unwrap()[1]));
  }

  #[test]
  fn empty_partitions_leave_instance_types_alone() {
    let cfg = Config::new_config(&props(
      "cluster_name: foo\ninstance_types: { a: {} }\npartitions: []\n",
    ));
    assert_eq!(cfg.instance_types().unwrap().keys().collect::<Vec<_>>(), vec!["a"]);
  }

  #[test]
  fn controller_sentinel_is_resolved_in_all_storage_lists() {
    let cfg = Config::new_config(&props(
      r#"
cluster_name: foo
network_storage:
  - { server_ip: $controller, remote_mount: /home }
  - { server_ip: 10.0.0.5, remote_mount: /data }
login_network_storage:
  - { server_ip: $controller, remote_mount: /apps }
partitions:
  - name: debug
    network_storage:
      - { server_ip: $controller, remote_mount: /scratch }
      - { server_ip: filer, remote_mount: /filer }
"#,
    ));

    let server_ips = |list: &[Value]| -> Vec<String> {
      list
        .iter()
        .map(|e| e.as_map().unwrap().get_str("server_ip").unwrap().to_string())
        .collect()
    };
    assert_eq!(server_ips(cfg.network_storage().unwrap()), vec!["foo-controller", "10.0.0.5"]);
    assert_eq!(server_ips(cfg.login_network_storage().unwrap()), vec!["foo-controller"]);

    let partition = cfg.partitions().unwrap()[0].as_map().unwrap();
    let partition_storage = partition.get("network_storage").and_then(Value::as_seq).unwrap();
    assert_eq!(server_ips(partition_storage), vec!["foo-controller", "filer"]);

    // Instance types are built from the resolved partitions.
    let instance_type = cfg.instance_types().unwrap().get("foo-compute-0").unwrap();
    assert_eq!(instance_type, &cfg.partitions().unwrap()[0]);
  }

  #[test]
  fn region_strips_the_zone_suffix() {
    let mut cfg = Config::new_config(&props("zone: us-central1-a\n"));
    assert_eq!(cfg.region(), Some("us-central1"));
    cfg.set("zone", "europe-west4-b");
    assert_eq!(cfg.region(), Some("europe-west4"));
    cfg.set("zone", Value::Null);
    assert_eq!(cfg.region(), None);
    cfg.set("zone", "nodash");
    assert_eq!(cfg.region(), Some(""));
  }

  #[test]
  fn instance_type_is_fetched_once() {
    let host = CountingHost::new(Some(r#"["http-server", "compute", "login"]"#));
    let cfg = Config::new_config(&Namespace::new()).with_host(host.clone());

    assert_eq!(cfg.instance_type(), Some(InstanceRole::Compute));
    assert_eq!(cfg.instance_type(), Some(InstanceRole::Compute));
    assert_eq!(host.metadata_calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn instance_type_lookup_tells_failure_from_no_match() {
    let no_match = CountingHost::new(Some(r#"["http-server"]"#));
    let cfg = Config::new_config(&Namespace::new()).with_host(no_match.clone());
    assert_eq!(cfg.instance_type_lookup(), RoleLookup::NoMatch);
    assert_eq!(cfg.instance_type(), None);

    let unavailable = CountingHost::new(None);
    let cfg = Config::new_config(&Namespace::new()).with_host(unavailable.clone());
    assert_eq!(cfg.instance_type(), None);
    assert_eq!(cfg.instance_type_lookup(), RoleLookup::Unavailable);
    assert_eq!(unavailable.metadata_calls.load(Ordering::SeqCst), 1);

    let garbage = CountingHost::new(Some("{not: [a, list]}"));
    let cfg = Config::new_config(&Namespace::new()).with_host(garbage);
    assert_eq!(cfg.instance_type_lookup(), RoleLookup::Unavailable);
  }

  #[test]
  fn hostname_is_fetched_once() {
    let host = CountingHost::new(None);
    let cfg = Config::new_config(&Namespace::new()).with_host(host.clone());
    assert_eq!(cfg.hostname(), "demo-compute-0-1");
    assert_eq!(cfg.hostname(), "demo-compute-0-1");
    assert_eq!(host.hostname_calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn unknown_fields_read_as_absent() {
    let cfg = Config::new_config(&Namespace::new());
    assert_eq!(cfg.get("totallyUnknownField"), None);
    assert!(!cfg.contains_key("totallyUnknownField"));

    let bare = Config::from_namespace(Namespace::new());
    assert_eq!(bare.get("totallyUnknownField"), None);
    assert_eq!(bare.project(), None);
  }

  #[test]
  fn saved_view_keeps_declared_order_and_strips_runtime_fields() {
    let cfg = Config::new_config(&props(
      r#"
munge_key: secret
cluster_name: foo
project: p
partitions:
  - { name: debug, machine_type: n1, max_node_count: 10, static_node_count: 1 }
"#,
    ));
    let saved = cfg.saved_view();
    assert_eq!(saved.keys().collect::<Vec<_>>(), SAVED_PROPS.to_vec());

    let entry = saved
      .get("instance_types")
      .and_then(Value::as_map)
      .and_then(|t| t.get("foo-compute-0"))
      .and_then(Value::as_map)
      .unwrap();
    assert_eq!(entry.keys().collect::<Vec<_>>(), vec!["machine_type"]);

    // The config itself is untouched.
    let partition = cfg.partitions().unwrap()[0].as_map().unwrap();
    assert_eq!(partition.get_str("name"), Some("debug"));
  }

  #[test]
  fn saved_view_skips_properties_missing_from_a_loaded_config() {
    let cfg = Config::from_namespace(props("zone: us-east1-b\nproject: p\n"));
    assert_eq!(cfg.saved_view().keys().collect::<Vec<_>>(), vec!["project", "zone"]);
  }

  #[test]
  fn config_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Config>();
  }
}
