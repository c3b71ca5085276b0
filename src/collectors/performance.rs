//! Short performance samples (vmstat, iostat, top) per host.
//!
//! Each tool runs for the configured number of seconds, so this collector
//! is not enabled by default.

use super::{Collector, CollectorKind};
use crate::artifact::Format;
use crate::context::CollectContext;
use crate::error::TaskResult;
use crate::exec::Target;
use crate::topology::{Params, Role};

pub fn collector() -> Collector {
    Collector::new("performance", CollectorKind::Bulk).on(Role::Node, collect_node)
}

fn collect_node(ctx: &CollectContext, host: &str, _params: &Params) -> TaskResult<()> {
    let target = Target::host(host);
    let secs = ctx.settings().performance_collect_seconds;

    ctx.collect(
        &target,
        &format!("hosts/{}/vmstat", host),
        Format::Txt,
        &format!("vmstat 1 {}", secs),
    );
    ctx.collect(
        &target,
        &format!("hosts/{}/iostat", host),
        Format::Txt,
        &format!("iostat -x 1 {}", secs),
    );
    ctx.collect(
        &target,
        &format!("hosts/{}/top", host),
        Format::Txt,
        &format!("top -b -d {} -n 10", secs),
    );

    Ok(())
}
