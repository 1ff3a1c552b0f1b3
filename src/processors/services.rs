//! Service state through the platform's service manager.
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use super::{Context, ItemStats, Processor, ProcessorResult};
use crate::blueprint::items::{Service, ServiceAction};
use crate::blueprint::{Blueprint, Items, ProcessorKind};
use crate::platform::Platform;

/// One service manager, chosen once per platform.
pub trait ServiceManager: Send + Sync + fmt::Debug {
    /// Manager name for log messages.
    fn name(&self) -> &'static str;

    /// Program and arguments that apply `action` to `service`.
    fn command(&self, action: ServiceAction, service: &str, elevated: bool) -> Vec<String>;

    /// A read-only command that succeeds when `action` is already in
    /// effect, for managers that can tell.
    fn probe(&self, _action: ServiceAction, _service: &str, _elevated: bool) -> Option<Vec<String>> {
        None
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

/// `systemctl`, in the user session unless elevated.
#[derive(Debug, Clone, Copy, Default)]
pub struct Systemd;

impl Systemd {
    fn base(elevated: bool) -> Vec<String> {
        if elevated {
            argv(&["systemctl"])
        } else {
            argv(&["systemctl", "--user"])
        }
    }
}

impl ServiceManager for Systemd {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn command(&self, action: ServiceAction, service: &str, elevated: bool) -> Vec<String> {
        let verb = match action {
            ServiceAction::Enable => "enable",
            ServiceAction::Disable => "disable",
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        };
        let mut cmd = Self::base(elevated);
        cmd.extend(argv(&[verb, service]));
        cmd
    }

    fn probe(&self, action: ServiceAction, service: &str, elevated: bool) -> Option<Vec<String>> {
        let verb = match action {
            ServiceAction::Enable => "is-enabled",
            ServiceAction::Start => "is-active",
            _ => return None,
        };
        let mut cmd = Self::base(elevated);
        cmd.extend(argv(&["--quiet", verb, service]));
        Some(cmd)
    }
}

/// `launchctl` on macOS.
#[derive(Debug, Clone, Copy, Default)]
pub struct Launchctl;

impl ServiceManager for Launchctl {
    fn name(&self) -> &'static str {
        "launchctl"
    }

    fn command(&self, action: ServiceAction, service: &str, _elevated: bool) -> Vec<String> {
        match action {
            ServiceAction::Enable => argv(&["launchctl", "load", "-w", service]),
            ServiceAction::Disable => argv(&["launchctl", "unload", "-w", service]),
            ServiceAction::Start => argv(&["launchctl", "start", service]),
            ServiceAction::Stop => argv(&["launchctl", "stop", service]),
            ServiceAction::Restart => argv(&["launchctl", "kickstart", "-k", service]),
        }
    }

    fn probe(&self, action: ServiceAction, service: &str, _elevated: bool) -> Option<Vec<String>> {
        matches!(action, ServiceAction::Start).then(|| argv(&["launchctl", "list", service]))
    }
}

/// The Windows service control manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sc;

impl ServiceManager for Sc {
    fn name(&self) -> &'static str {
        "sc"
    }

    fn command(&self, action: ServiceAction, service: &str, _elevated: bool) -> Vec<String> {
        match action {
            ServiceAction::Enable => argv(&["sc", "config", service, "start=", "auto"]),
            ServiceAction::Disable => argv(&["sc", "config", service, "start=", "disabled"]),
            ServiceAction::Start => argv(&["sc", "start", service]),
            ServiceAction::Stop => argv(&["sc", "stop", service]),
            ServiceAction::Restart => argv(&[
                "powershell",
                "-NoProfile",
                "-Command",
                "Restart-Service",
                service,
            ]),
        }
    }
}

/// The service manager for `platform`; none on unsupported systems.
#[must_use]
pub fn for_platform(platform: &Platform) -> Option<Arc<dyn ServiceManager>> {
    if platform.is_windows() {
        Some(Arc::new(Sc))
    } else if platform.is_macos() {
        Some(Arc::new(Launchctl))
    } else if platform.is_linux() {
        Some(Arc::new(Systemd))
    } else {
        None
    }
}

/// Applies `services` sections.
#[derive(Debug, Clone, Copy)]
pub struct ServicesProcessor;

impl ServicesProcessor {
    fn apply(ctx: &Context, manager: &dyn ServiceManager, service: &Service) -> Result<bool> {
        let sudo = service.elevated && ctx.elevate;
        if let Some(probe) = manager.probe(service.action, &service.name, service.elevated)
            && let Some((program, args)) = probe.split_first()
        {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            if ctx
                .executor
                .run_unchecked(program, &args)
                .is_ok_and(|r| r.success)
            {
                return Ok(false);
            }
        }

        let mut cmd = manager.command(service.action, &service.name, service.elevated);
        if sudo {
            cmd.insert(0, "sudo".to_string());
        }
        if ctx.dry_run {
            ctx.log.dry_run(&cmd.join(" "));
            return Ok(true);
        }
        if let Some((program, args)) = cmd.split_first() {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            ctx.executor.run(program, &args)?;
        }
        Ok(true)
    }
}

impl Processor for ServicesProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Services
    }

    fn run(&self, ctx: &Context, blueprint: &Blueprint) -> Result<ProcessorResult> {
        let Items::Services(services) = &blueprint.items else {
            return Ok(ProcessorResult::Skipped("no services".to_string()));
        };
        if services.is_empty() {
            return Ok(ProcessorResult::Skipped("no services".to_string()));
        }
        let Some(manager) = ctx.services.as_deref() else {
            return Ok(ProcessorResult::Skipped(format!(
                "no service manager for {}",
                ctx.platform.os
            )));
        };
        ctx.log.debug(&format!(
            "{} services via {}",
            services.len(),
            manager.name()
        ));

        let mut stats = ItemStats::default();
        for service in services {
            ctx.check_cancelled()?;
            match Self::apply(ctx, manager, service) {
                Ok(true) => stats.changed += 1,
                Ok(false) => {
                    ctx.log.debug(&format!("{}: already ok", service.name));
                    stats.already_ok += 1;
                }
                Err(e) => {
                    ctx.log.warn(&format!("service {}: {e:#}", service.name));
                    stats.skipped += 1;
                }
            }
        }
        Ok(stats.finish(ctx))
    }
}
