//! Node naming helpers.

/// The partition part of a compute node name: `<prefix>-<pid>-<nid>` becomes
/// `<prefix>-<pid>`. A name without a dash yields an empty string.
pub fn partition_of(node_name: &str) -> &str {
  node_name.rsplit_once('-').map_or("", |(partition, _)| partition)
}
