//! Simulated CC110x node attached to a Linux TAP interface.
//!
//! Each line typed on stdin is broadcast as one packet; received packets
//! are printed. Several nodes on TAP interfaces joined by a bridge hear
//! each other.
//!
//! ```bash
//! sudo ip tuntap add tap0 mode tap user $USER && sudo ip link set tap0 up
//! cargo run --bin sim-node --features tap -- tap0 --address 7 --channel 3
//! cargo run --bin sim-node --features tap -- tap1 --config node.json
//! ```
//!
//! `--config` takes a JSON file:
//!
//! ```json
//! { "radio": { "channel": 3, "address": 7, "band": "Mhz868" },
//!   "sim": { "append_status": true, "sync_interrupts": true } }
//! ```

#[cfg(target_os = "linux")]
mod node {
    use cc110x_rs::radio::{
        mailbox, Cc110x, Cc110xParams, Packet, RadioEvent, RadioMessage, RadioSettings, SharedBus,
        SoftIrqLines, Worker, MAX_DATA_LENGTH,
    };
    use cc110x_rs::sim::{SimConfig, SimulatedChip, TapDevice, TunnelPump};
    use log::{error, info, warn};
    use serde::{Deserialize, Serialize};
    use std::error::Error;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio_util::sync::CancellationToken;

    const USAGE: &str = "usage: sim-node <tap-interface> [--address N] [--channel N] [--config FILE]";

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct NodeConfig {
        radio: RadioSettings,
        sim: SimConfig,
    }

    struct Args {
        iface: String,
        config: NodeConfig,
    }

    fn value_of(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, Box<dyn Error>> {
        args.next().ok_or_else(|| format!("{} needs a value", flag).into())
    }

    fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, Box<dyn Error>> {
        let mut iface = None;
        let mut address = None;
        let mut channel = None;
        let mut config = NodeConfig::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--address" => address = Some(value_of(&mut args, &arg)?.parse::<u16>()?),
                "--channel" => channel = Some(value_of(&mut args, &arg)?.parse::<u8>()?),
                "--config" => {
                    let text = std::fs::read_to_string(value_of(&mut args, &arg)?)?;
                    config = serde_json::from_str(&text)?;
                }
                "-h" | "--help" => return Err(USAGE.into()),
                _ if iface.is_none() && !arg.starts_with('-') => iface = Some(arg.clone()),
                _ => return Err(format!("unexpected argument {:?}\n{}", arg, USAGE).into()),
            }
        }
        if let Some(address) = address {
            config.radio.address = address;
        }
        if let Some(channel) = channel {
            config.radio.channel = channel;
        }
        config.radio.validate()?;
        Ok(Args {
            iface: iface.ok_or(USAGE)?,
            config,
        })
    }

    fn print_line(msg: &str) {
        println!("{}", msg);
        let _ = std::io::stdout().flush();
    }

    pub async fn run() -> Result<(), Box<dyn Error>> {
        let Args { iface, config } = parse_args(std::env::args().skip(1))?;
        info!("=== cc110x sim-node on {} ===", iface);

        let tap = TapDevice::open(&iface)?;
        let mut chip = SimulatedChip::new(config.sim, tap.tunnel_config());
        chip.set_sink(Box::new(tap.writer()?));

        let lines = SoftIrqLines::new();
        let (handle, mailbox) = mailbox();
        chip.connect_interrupts(lines.clone(), Arc::new(handle.clone()));
        let bus = SharedBus::new(chip);

        let mut dev = Cc110x::new(bus.clone(), lines, Cc110xParams::default());
        dev.set_status_appended(config.sim.append_status);
        dev.setup(&config.radio)?;
        let address = dev.address();
        dev.print_config()?;

        let device = Arc::new(Mutex::new(dev));
        let (worker, mut events) = Worker::new(mailbox);
        let worker_thread = worker.spawn(Arc::clone(&device))?;
        handle.post(RadioMessage::InitMode)?;

        let cancel = CancellationToken::new();
        let tap_task = tokio::spawn(tap.run(TunnelPump::new(bus.clone()), cancel.clone()));
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();

        print_line(&format!(
            "node {} on channel {}, type a line to broadcast (Ctrl+C to exit)",
            address, config.radio.channel
        ));
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    print_line("\nShutting down...");
                    break;
                }
                event = events.recv() => match event {
                    Some(RadioEvent::PacketReceived(rx)) => print_line(&format!(
                        "[{} -> {}] {}",
                        rx.packet.src,
                        rx.packet.dest,
                        String::from_utf8_lossy(&rx.packet.payload)
                    )),
                    Some(RadioEvent::RxAvailable(n)) => {
                        let mut dev = device.lock().unwrap_or_else(|p| p.into_inner());
                        match dev.read_packet() {
                            Ok(Some(packet)) => print_line(&format!(
                                "[{} -> {}] {}",
                                packet.src,
                                packet.dest,
                                String::from_utf8_lossy(&packet.payload)
                            )),
                            Ok(None) => {}
                            Err(e) => warn!("rx ({} bytes waiting): {}", n, e),
                        }
                    }
                    Some(RadioEvent::TxComplete) => info!("tx complete"),
                    Some(RadioEvent::TxFailed) => warn!("tx failed"),
                    None => {
                        error!("radio worker stopped");
                        break;
                    }
                },
                line = stdin.next_line() => match line {
                    Ok(Some(text)) => {
                        for chunk in text.as_bytes().chunks(MAX_DATA_LENGTH) {
                            let packet = Packet::new(0, address, 0, chunk)?;
                            if let Err(e) = handle.send_packet(&packet) {
                                warn!("not sent: {}", e);
                            }
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!("stdin: {}", e);
                        break;
                    }
                },
            }
        }

        cancel.cancel();
        match tap_task.await {
            Ok(Ok(stats)) => info!("tap pump: {:?}", stats),
            Ok(Err(e)) => error!("tap pump: {}", e),
            Err(e) => error!("tap task: {}", e),
        }
        if handle.post(RadioMessage::Shutdown).is_err() {
            warn!("worker mailbox unavailable at shutdown");
        }
        match tokio::task::spawn_blocking(move || worker_thread.join()).await {
            Ok(Ok(stats)) => info!("worker: {:?}", stats),
            _ => error!("worker thread panicked"),
        }
        bus.with(|chip| info!("sim: {:?}", chip.stats()));
        Ok(())
    }
}

#[cfg(target_os = "linux")]
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = node::run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(not(target_os = "linux"))]
fn main() {
    println!("sim-node needs a Linux TAP interface.");
}
