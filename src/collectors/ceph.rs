//! Ceph cluster state: control-plane dumps, monitor logs, OSD config and
//! the devices backing each OSD.

use super::{Collector, CollectorKind};
use crate::artifact::Format;
use crate::context::CollectContext;
use crate::error::{TaskError, TaskResult};
use crate::exec::Target;
use crate::topology::{Params, Role};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::warn;

/// Control-plane dumps taken on every run (`pg dump` is added conditionally)
const MASTER_COMMANDS: &[&str] = &[
    "osd tree",
    "df",
    "auth list",
    "osd dump",
    "health",
    "health detail",
    "mon_status",
    "osd lspools",
    "osd perf",
];

pub fn collector() -> Collector {
    Collector::new("ceph", CollectorKind::Bulk)
        .on(Role::Master, collect_master)
        .on(Role::Monitor, collect_monitor)
        .on(Role::Osd, collect_osd)
}

/// Run a command whose output a later step depends on
fn required(ctx: &CollectContext, target: &Target, command: &str) -> TaskResult<String> {
    let out = ctx.run(target, command);
    if out.success {
        Ok(out.text())
    } else {
        Err(TaskError::RequiredCommand {
            target: target.to_string(),
            command: command.to_string(),
            output: out.text().trim().to_string(),
        })
    }
}

fn collect_master(ctx: &CollectContext, _node: &str, _params: &Params) -> TaskResult<()> {
    let settings = ctx.settings();
    let ceph = settings.ceph_cmd();
    let local = Target::Local;

    let now = Utc::now();
    let collected_at = format!(
        "{}\n{}\n{:.3}",
        now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        now.format("%Y-%m-%d %H:%M:%S"),
        now.timestamp_millis() as f64 / 1000.0
    );
    ctx.emit("master/collected_at", Format::Txt, true, collected_at);

    let status_cmd = format!("{}status", ceph);
    let status = ctx.run(&local, &status_cmd);
    ctx.emit("master/status", Format::Json, status.success, status.output.clone());
    if !status.success {
        return Err(TaskError::RequiredCommand {
            target: local.to_string(),
            command: status_cmd,
            output: status.text().trim().to_string(),
        });
    }

    let mut commands = MASTER_COMMANDS.to_vec();
    match pg_count(&status.output) {
        Some(num_pgs) if num_pgs > settings.max_pg_dump_count => warn!(
            num_pgs,
            max_pg_dump_count = settings.max_pg_dump_count,
            "pg dump skipped, raise --max-pg-dump-count to include it"
        ),
        Some(_) => commands.push("pg dump"),
        None => warn!("Cannot read PG count from status, pg dump skipped"),
    }

    for cmd in commands {
        let path = format!("master/{}", cmd.replace(' ', "_"));
        ctx.collect(&local, &path, Format::Json, &format!("{}{}", ceph, cmd));
    }

    ctx.collect(
        &local,
        "master/rados_df",
        Format::Json,
        &format!("{}df", settings.rados_cmd()),
    );
    ctx.collect(
        &local,
        "master/crushmap",
        Format::Bin,
        &format!("{}osd getcrushmap", ceph),
    );

    Ok(())
}

/// `pgmap.num_pgs` from `ceph status` output
fn pg_count(status: &[u8]) -> Option<u64> {
    let value: Value = serde_json::from_slice(status).ok()?;
    value.get("pgmap")?.get("num_pgs")?.as_u64()
}

fn collect_monitor(ctx: &CollectContext, host: &str, params: &Params) -> TaskResult<()> {
    let settings = ctx.settings();
    let target = Target::host(host);
    let base = format!("mon/{}", host);
    let name = params.get_str("name").unwrap_or_else(|| host.to_string());
    let lines = settings.ceph_log_max_lines;

    ctx.collect(&target, &format!("{}/mon_daemons", base), Format::Txt, "ps aux | grep ceph-mon");
    ctx.collect(
        &target,
        &format!("{}/mon_log", base),
        Format::Txt,
        &format!("tail -n {} /var/log/ceph/ceph-mon.{}.log", lines, name),
    );
    ctx.collect(
        &target,
        &format!("{}/ceph_log", base),
        Format::Txt,
        &format!("tail -n {} /var/log/ceph/ceph.log", lines),
    );
    ctx.collect(
        &target,
        &format!("{}/ceph_audit", base),
        Format::Txt,
        &format!("tail -n {} /var/log/ceph/ceph.audit.log", lines),
    );

    Ok(())
}

#[derive(Debug, Deserialize)]
struct OsdPaths {
    osd_journal: String,
    osd_data: String,
}

fn collect_osd(ctx: &CollectContext, host: &str, params: &Params) -> TaskResult<()> {
    let osd_id = params.get_i64("osd_id").ok_or_else(|| TaskError::MissingParam {
        node: host.to_string(),
        name: "osd_id".to_string(),
    })?;

    let target = Target::host(host);
    let base = format!("osd/{}", osd_id);

    let ps_cmd = "ps aux | grep ceph-osd";
    let ps = ctx.run(&target, ps_cmd);
    if !ps.success {
        warn!(command = %ps_cmd, node = %target, "Command failed");
    }
    let running = ps.success && osd_running(&ps.text(), osd_id);
    ctx.emit(&format!("{}/osd_daemons", base), Format::Txt, ps.success, ps.output);

    ctx.collect(
        &target,
        &format!("{}/log", base),
        Format::Txt,
        &format!(
            "tail -n {} /var/log/ceph/ceph-osd.{}.log",
            ctx.settings().ceph_log_max_lines,
            osd_id
        ),
    );

    let paths = if running {
        let cfg_cmd = format!(
            "sudo ceph -f json --admin-daemon /var/run/ceph/ceph-osd.{}.asok config show",
            osd_id
        );
        let cfg = ctx.run(&target, &cfg_cmd);
        ctx.emit(&format!("{}/config", base), Format::Json, cfg.success, cfg.output.clone());
        if !cfg.success {
            return Err(TaskError::RequiredCommand {
                target: target.to_string(),
                command: cfg_cmd,
                output: cfg.text().trim().to_string(),
            });
        }

        serde_json::from_slice::<OsdPaths>(&cfg.output).map_err(|e| {
            TaskError::UnexpectedOutput {
                target: target.to_string(),
                command: cfg_cmd,
                reason: e.to_string(),
            }
        })?
    } else {
        warn!(
            osd_id,
            node = %host,
            "OSD is down, no config available, using default data and journal paths"
        );
        OsdPaths {
            osd_journal: format!("/var/lib/ceph/osd/ceph-{}/journal", osd_id),
            osd_data: format!("/var/lib/ceph/osd/ceph-{}", osd_id),
        }
    };

    // Journal and data devices are independent; report the first failure
    let mut first_error = None;
    for (name, file) in [("journal", &paths.osd_journal), ("data", &paths.osd_data)] {
        let path = format!("{}/{}", base, name);
        if let Err(e) = emit_device_info(ctx, &target, &path, file) {
            match first_error {
                None => first_error = Some(e),
                Some(_) => warn!(path = %path, error = %e, "Device info failed"),
            }
        }
    }

    first_error.map_or(Ok(()), Err)
}

/// Whether a `ps aux` listing shows the daemon for `osd_id`
fn osd_running(ps_output: &str, osd_id: i64) -> bool {
    let id = osd_id.to_string();
    ps_output
        .lines()
        .filter(|line| line.contains("ceph-osd"))
        .any(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            tokens
                .windows(2)
                .any(|w| (w[0] == "-i" || w[0] == "--id") && w[1] == id)
        })
}

#[derive(Debug, Serialize)]
struct DeviceStats {
    dev: String,
    root_dev: String,
    used: u64,
    avail: u64,
    is_ssd: bool,
}

/// Usage and backing device of the filesystem holding `device_file`
///
/// Every step feeds the next, so any failure stops this device.
fn emit_device_info(
    ctx: &CollectContext,
    target: &Target,
    path: &str,
    device_file: &str,
) -> TaskResult<()> {
    if !ctx.allowed(path) {
        return Ok(());
    }

    let df_cmd = format!("df {}", device_file);
    let df = required(ctx, target, &df_cmd)?;
    let usage = parse_df(&df).ok_or_else(|| TaskError::UnexpectedOutput {
        target: target.to_string(),
        command: df_cmd.clone(),
        reason: "no filesystem line".to_string(),
    })?;

    let dev_link = if usage.filesystem == "udev" {
        device_file
    } else {
        usage.filesystem.as_str()
    };

    let dev = required(ctx, target, &format!("readlink -f {}", dev_link))?
        .trim()
        .to_string();
    let root_dev = dev.trim_end_matches(|c: char| c.is_ascii_digit()).to_string();

    let dev_name = Path::new(&root_dev)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let rotational = required(
        ctx,
        target,
        &format!("cat /sys/block/{}/queue/rotational", dev_name),
    )?;
    let is_ssd = rotational.trim() == "0";

    ctx.collect(
        target,
        &format!("{}/hdparm", path),
        Format::Txt,
        &format!("sudo hdparm -I {}", root_dev),
    );
    ctx.collect(
        target,
        &format!("{}/smartctl", path),
        Format::Txt,
        &format!("sudo smartctl -a {}", root_dev),
    );

    let stats = DeviceStats {
        dev,
        root_dev,
        used: usage.used_kb * 1024,
        avail: usage.avail_kb * 1024,
        is_ssd,
    };
    let payload = serde_json::to_vec(&stats).map_err(|e| TaskError::UnexpectedOutput {
        target: target.to_string(),
        command: df_cmd,
        reason: e.to_string(),
    })?;
    ctx.emit(&format!("{}/stats", path), Format::Json, true, payload);

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct DfUsage {
    filesystem: String,
    used_kb: u64,
    avail_kb: u64,
}

/// Parse `df` output (1K blocks); tolerates the line wrap `df` applies to
/// long filesystem names
fn parse_df(output: &str) -> Option<DfUsage> {
    let body: Vec<&str> = output
        .lines()
        .skip(1)
        .flat_map(str::split_whitespace)
        .collect();

    Some(DfUsage {
        filesystem: body.first()?.to_string(),
        used_kb: body.get(2)?.parse().ok()?,
        avail_kb: body.get(3)?.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_df() {
        let out = "Filesystem     1K-blocks    Used Available Use% Mounted on\n\
                   /dev/sdb1      976284600 1234567 975050033   1% /var/lib/ceph/osd/ceph-0\n";
        assert_eq!(
            parse_df(out),
            Some(DfUsage {
                filesystem: "/dev/sdb1".into(),
                used_kb: 1234567,
                avail_kb: 975050033,
            })
        );

        let wrapped = "Filesystem 1K-blocks Used Available Use% Mounted on\n\
                       /dev/mapper/very-long-volume-name\n\
                       100 40 60 40% /data\n";
        let usage = parse_df(wrapped).unwrap();
        assert_eq!(usage.filesystem, "/dev/mapper/very-long-volume-name");
        assert_eq!(usage.used_kb, 40);

        assert_eq!(parse_df("Filesystem 1K-blocks Used\n"), None);
        assert_eq!(parse_df(""), None);
    }

    #[test]
    fn test_osd_running() {
        let ps = "root 1 0.0 ceph-osd -f --cluster ceph --id 3 --setuser ceph\n\
                  root 2 0.0 /usr/bin/ceph-osd -i 12 --pid-file x\n\
                  root 3 0.0 grep ceph-osd\n";
        assert!(osd_running(ps, 3));
        assert!(osd_running(ps, 12));
        assert!(!osd_running(ps, 1));
        assert!(!osd_running(ps, 0));
    }

    #[test]
    fn test_pg_count() {
        assert_eq!(pg_count(br#"{"pgmap": {"num_pgs": 4096}}"#), Some(4096));
        assert_eq!(pg_count(br#"{"health": {}}"#), None);
        assert_eq!(pg_count(b"garbage"), None);
    }
}
