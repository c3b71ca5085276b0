//! Resource usage counters (disk and network), sampled before and after
//! the bulk collection.
//!
//! Each sample is stored under its own timestamped name so the two samples
//! of a host never collide.

use super::{Collector, CollectorKind};
use crate::artifact::Format;
use crate::context::CollectContext;
use crate::error::TaskResult;
use crate::exec::Target;
use crate::topology::{Params, Role};
use chrono::Utc;

/// Parameter carrying the sample index (0 = phase 1, 1 = phase 2)
pub const SAMPLE_PARAM: &str = "sample";

pub fn collector() -> Collector {
    Collector::new("resource", CollectorKind::Usage).on(Role::Node, collect_node)
}

/// Parameters for sample `index` of a host
pub fn sample_params(index: i64) -> Params {
    Params::new().with(SAMPLE_PARAM, index)
}

fn collect_node(ctx: &CollectContext, host: &str, params: &Params) -> TaskResult<()> {
    let target = Target::host(host);
    let sample = params.get_i64(SAMPLE_PARAM).unwrap_or(0);

    let path = sample_path(host, Utc::now().timestamp(), sample, "disk");
    ctx.collect(&target, &path, Format::Txt, "cat /proc/diskstats");

    let path = sample_path(host, Utc::now().timestamp(), sample, "net");
    ctx.collect(&target, &path, Format::Txt, "cat /proc/net/dev");

    Ok(())
}

fn sample_path(host: &str, timestamp: i64, sample: i64, kind: &str) -> String {
    format!("perf_stats/{}/{}-{}-{}", host, timestamp, sample, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_paths_differ_per_sample() {
        let first = sample_path("h1", 1_700_000_000, 0, "disk");
        let second = sample_path("h1", 1_700_000_000, 1, "disk");
        assert_eq!(first, "perf_stats/h1/1700000000-0-disk");
        assert_ne!(first, second);
    }

    #[test]
    fn test_sample_params() {
        assert_eq!(sample_params(1).get_i64(SAMPLE_PARAM), Some(1));
    }
}
