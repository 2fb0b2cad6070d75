//! `nova-ext run` - drive one command through a headless session.

use anyhow::{anyhow, bail, Result};
use console::style;

use crate::config::HostConfig;
use crate::extensions::session::{CommandEntry, Element};
use crate::extensions::{
    CommandContext, CommandSession, HostEffect, JsCommand, Sandbox, SandboxOptions, SessionState,
};

use super::bundle_host;

pub async fn run_command(config: &HostConfig, extension: &str, command: &str, json: bool) -> Result<()> {
    let host = bundle_host(config);
    let bundle = host
        .resolve(extension, command)
        .await
        .ok_or_else(|| anyhow!("No bundle available for {}/{} (see log)", extension, command))?;

    println!(
        "{} {} {}",
        style("→").cyan(),
        style(&bundle.title).bold(),
        style(format!("[{}]", bundle.mode.as_str())).magenta()
    );

    let mut sandbox = Sandbox::new(SandboxOptions {
        platform: config.runtime.platform.clone(),
        settle_timeout: config.settle_timeout(),
    });
    let ctx = CommandContext::for_extension(
        &config.extensions_dir().join(extension),
        command,
        bundle.mode,
    )
    .with_support_dir(config.support_dir(extension));

    match sandbox.try_load(&bundle.bundle_text, &ctx) {
        Ok(entry) => {
            let session = CommandSession::new(entry, bundle.mode)
                .with_close_delay(config.no_view_close_delay());
            drive(session, json).await
        }
        Err(e) => drive(CommandSession::<JsCommand<'_>>::failed(e.to_string()), json).await,
    }
}

async fn drive<E: CommandEntry>(mut session: CommandSession<E>, json: bool) -> Result<()> {
    session.start().await;

    if session.state() == SessionState::ViewReady {
        // First render schedules effects; let them run before the real one.
        session.view();
        session.settle().await;
    }

    if let Some(tree) = session.view() {
        print_tree(&tree, json)?;
    }

    for effect in session.take_outbox() {
        println!("{} {}", style("effect").yellow(), describe_effect(&effect));
    }

    let state = session.state();
    println!("{} {}", style("state").dim(), state.as_str());

    match state {
        SessionState::LoadFailed { message } => bail!("Failed to load command: {}", message),
        SessionState::NoViewError { message } => bail!("Command failed: {}", message),
        _ => Ok(()),
    }
}

fn print_tree(tree: &Element, json: bool) -> Result<()> {
    let text = if json {
        serde_json::to_string(tree)?
    } else {
        serde_json::to_string_pretty(tree)?
    };
    println!("{}", text);
    Ok(())
}

fn describe_effect(effect: &HostEffect) -> String {
    match effect {
        HostEffect::Toast {
            style: toast_style,
            title,
            message,
        } => match message {
            Some(message) => format!("toast({:?}) {}: {}", toast_style, title, message),
            None => format!("toast({:?}) {}", toast_style, title),
        },
        HostEffect::Hud { title } => format!("hud {}", title),
        HostEffect::Open { target } => format!("open {}", target),
        HostEffect::Clipboard { text } => format!("clipboard {} chars", text.chars().count()),
        HostEffect::CloseMainWindow => "close main window".to_string(),
        other => format!("{:?}", other),
    }
}
