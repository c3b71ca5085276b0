//! Base host inventory, collected on every discovered host.

use super::{Collector, CollectorKind};
use crate::artifact::Format;
use crate::context::CollectContext;
use crate::error::TaskResult;
use crate::exec::Target;
use crate::topology::{Params, Role};

/// (artifact name, format, command)
const NODE_COMMANDS: &[(&str, Format, &str)] = &[
    ("lshw", Format::Xml, "lshw -xml"),
    ("lsblk", Format::Txt, "lsblk -a"),
    ("diskstats", Format::Txt, "cat /proc/diskstats"),
    ("uname", Format::Txt, "uname -a"),
    ("dmidecode", Format::Txt, "dmidecode"),
    ("meminfo", Format::Txt, "cat /proc/meminfo"),
    ("loadavg", Format::Txt, "cat /proc/loadavg"),
    ("cpuinfo", Format::Txt, "cat /proc/cpuinfo"),
    ("mount", Format::Txt, "mount"),
    ("ipa", Format::Txt, "ip -o -4 a"),
    ("netdev", Format::Txt, "cat /proc/net/dev"),
    ("ceph_conf", Format::Txt, "cat /etc/ceph/ceph.conf"),
];

pub fn collector() -> Collector {
    Collector::new("node", CollectorKind::Bulk).on(Role::Node, collect_node)
}

fn collect_node(ctx: &CollectContext, host: &str, _params: &Params) -> TaskResult<()> {
    let target = Target::host(host);
    for (name, format, command) in NODE_COMMANDS {
        ctx.collect(&target, &format!("hosts/{}/{}", host, name), *format, command);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_artifact_names_are_unique() {
        let names: HashSet<_> = NODE_COMMANDS.iter().map(|(name, _, _)| *name).collect();
        assert_eq!(names.len(), NODE_COMMANDS.len());
    }
}
