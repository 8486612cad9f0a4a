//! Command-line interface and REPL
//!
//! Interactive console over the engine handles. Intents are fire-and-forget
//! (they land in command order on the class actor); queries await their
//! response before the next prompt.

use crate::device::{Device, DeviceClass, DeviceId};
use crate::engine::EngineHandle;
use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub async fn run_repl(engine: EngineHandle) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("devlock console - type 'help' for commands, 'exit' to quit");

    loop {
        let readline = rl.readline("devlock> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);
                if line == "exit" || line == "quit" {
                    break;
                }
                if let Err(e) = dispatch(&engine, line).await {
                    println!("error: {:#}", e);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                println!("readline error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

async fn dispatch(engine: &EngineHandle, line: &str) -> Result<()> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    match parts.as_slice() {
        ["help"] => print_help(),

        ["devices"] | ["list"] => {
            let devices = engine.list_all().await;
            print_devices(&devices);
        }

        ["refresh"] => {
            let mut devices = engine.audio.refresh_now().await;
            devices.extend(engine.camera.refresh_now().await);
            print_devices(&devices);
        }

        ["volume", percent] => {
            let percent: u8 = percent.parse()?;
            anyhow::ensure!(percent <= 100, "volume must be 0-100");
            engine.set_volume(percent);
            println!("volume -> {}%", percent);
        }

        ["mute"] => {
            engine.set_mute(true);
            println!("muted");
        }
        ["unmute"] => {
            engine.set_mute(false);
            println!("unmuted");
        }

        ["lock", "on"] => {
            engine.set_lock(true, None);
            println!("volume lock on");
        }
        ["lock", "on", percent] => {
            let percent: u8 = percent.parse()?;
            anyhow::ensure!(percent <= 100, "volume must be 0-100");
            engine.set_lock(true, Some(percent));
            println!("volume lock on at {}%", percent);
        }
        ["lock", "off"] => {
            engine.set_lock(false, None);
            println!("volume lock off");
        }

        ["prefer", "none"] => {
            engine.set_preferred(None);
            println!("preferred device cleared (following OS default)");
        }
        ["prefer", id] => {
            engine.set_preferred(Some(DeviceId::from(*id)));
            println!("preferred device -> {}", id);
        }
        ["detect"] => {
            let candidates = engine.detect_preferred().await;
            if candidates.is_empty() {
                println!("no non-default audio devices found");
            } else {
                println!("preferred-device candidates:");
                print_devices(&candidates);
            }
        }

        ["cam", "on", id] => {
            engine.enable_camera(DeviceId::from(*id));
            println!("camera {} -> enabled", id);
        }
        ["cam", "off", id] => {
            engine.disable_camera(DeviceId::from(*id));
            println!("camera {} -> disabled", id);
        }
        ["cams", "on"] => {
            engine.enable_all_cameras();
            println!("all cameras -> enabled");
        }
        ["cams", "off"] => {
            engine.disable_all_cameras();
            println!("all cameras -> disabled");
        }

        ["reconcile", class, toggle] => {
            let class = DeviceClass::from_str(class)
                .ok_or_else(|| anyhow::anyhow!("unknown class: {} (audio|camera)", class))?;
            let enabled = match *toggle {
                "on" => true,
                "off" => false,
                other => anyhow::bail!("expected on|off, got {}", other),
            };
            engine.for_class(class).set_reconcile_enabled(enabled);
            println!(
                "{} reconciliation -> {}",
                class,
                if enabled { "on" } else { "off" }
            );
        }

        _ => println!("unknown command: {} (try 'help')", line),
    }

    Ok(())
}

fn print_devices(devices: &[Device]) {
    if devices.is_empty() {
        println!("  (no devices)");
        return;
    }
    for device in devices {
        println!(
            "  [{}] {} - {}{}",
            device.class,
            device.id,
            device.display_name,
            if device.is_default { " (default)" } else { "" }
        );
    }
}

fn print_help() {
    println!("commands:");
    println!("  devices | list          show tracked devices");
    println!("  refresh                 enumerate now and show devices");
    println!("  volume <0-100>          set the target mic volume");
    println!("  mute | unmute           mute/unmute the target mic");
    println!("  lock on [percent]       hold the mic volume continuously");
    println!("  lock off                stop holding the volume");
    println!("  prefer <id> | none      pin audio commands to a device");
    println!("  detect                  list non-default mics to pin");
    println!("  cam on|off <id>         enable/disable one camera");
    println!("  cams on|off             enable/disable every camera");
    println!("  reconcile <class> on|off  pause/resume a class loop");
    println!("  exit | quit");
}
