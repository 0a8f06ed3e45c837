//! CC110x firmware for ESP32.
//!
//! Brings up the transceiver, starts the event worker, logs every received
//! packet and broadcasts a beacon every `BEACON_INTERVAL`.

#[cfg(feature = "esp32")]
fn main() {
    use cc110x_rs::board::{open_transport, Esp32Gdo, SpiPins};
    use cc110x_rs::radio::{mailbox, Cc110x, Cc110xParams, Packet, RadioEvent, RadioMessage, RadioSettings, SharedBus, Worker};
    use esp_idf_hal::peripherals::Peripherals;
    use log::{error, info, warn};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const BEACON_INTERVAL: Duration = Duration::from_secs(10);

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("=== cc110x firmware starting ===");

    let Some(peripherals) = Peripherals::take().ok() else {
        error!("peripherals already taken");
        return;
    };
    let params = Cc110xParams::default();
    let settings = RadioSettings::default();

    let transport = match open_transport(peripherals.spi2, &SpiPins::default(), &params) {
        Ok(t) => t,
        Err(e) => {
            error!("SPI setup failed: {}", e);
            return;
        }
    };
    let gdo = match Esp32Gdo::new(&params) {
        Ok(g) => g,
        Err(e) => {
            error!("GPIO setup failed: {}", e);
            return;
        }
    };

    let (handle, mailbox) = mailbox();
    if let Err(e) = gdo.start_bridge(handle.clone()) {
        error!("{}", e);
        return;
    }

    let mut dev = Cc110x::new(SharedBus::new(transport), gdo, params);
    if let Err(e) = dev.setup(&settings) {
        error!("radio setup failed: {}", e);
        return;
    }
    if let Err(e) = dev.print_config() {
        warn!("cannot read radio state: {}", e);
    }
    let address = dev.address();

    let device = Arc::new(Mutex::new(dev));
    let (worker, mut events) = Worker::new(mailbox);
    if let Err(e) = worker.spawn(Arc::clone(&device)) {
        error!("cannot start worker: {}", e);
        return;
    }
    if let Err(e) = handle.post(RadioMessage::InitMode) {
        error!("cannot start receiver: {}", e);
        return;
    }

    let beacon = handle.clone();
    let _ = std::thread::Builder::new().name("beacon".into()).spawn(move || {
        let mut seq: u32 = 0;
        loop {
            std::thread::sleep(BEACON_INTERVAL);
            seq = seq.wrapping_add(1);
            match Packet::new(0, address, 0, seq.to_be_bytes()) {
                Ok(packet) => {
                    if let Err(e) = beacon.send_packet(&packet) {
                        warn!("beacon {} not queued: {}", seq, e);
                    }
                }
                Err(e) => warn!("beacon: {}", e),
            }
        }
    });

    while let Some(event) = events.blocking_recv() {
        match event {
            RadioEvent::PacketReceived(rx) => info!(
                "rx from {} ({} dBm, lqi {}): {:02x?}",
                rx.packet.src,
                rx.rssi_dbm(),
                rx.lqi,
                rx.packet.payload
            ),
            RadioEvent::RxAvailable(n) => {
                let mut dev = device.lock().unwrap_or_else(|p| p.into_inner());
                match dev.read_packet() {
                    Ok(Some(packet)) => info!("rx from {}: {:02x?}", packet.src, packet.payload),
                    Ok(None) => {}
                    Err(e) => warn!("rx ({} bytes waiting): {}", n, e),
                }
            }
            RadioEvent::TxComplete => info!("tx complete"),
            RadioEvent::TxFailed => warn!("tx failed"),
        }
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("On the host, run the simulator: cargo run --bin sim-node --features tap -- tap0");
}
