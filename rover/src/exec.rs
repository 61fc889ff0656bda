//! Mission execution.
//!
//! The manager loop holds the rover in Idle until the queue has work, runs
//! exactly one mission at a time in its own task, and blocks on the
//! mission-finished channel before looking at the queue again. An empty queue
//! triggers a batch prefetch over the link, with a backoff when the
//! coordinator has nothing to hand out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, info, warn};

use fleet_protocol::mission::MissionPayload;

use crate::config::Config;
use crate::devices::Devices;
use crate::link::Link;
use crate::motion::{move_to, MotionTuning};
use crate::queue::MissionQueue;
use crate::reports::ReportSource;

pub struct Executor {
    cfg: Config,
    link: Arc<Link>,
    queue: Arc<MissionQueue>,
    devices: Arc<Devices>,
    executing: Arc<AtomicBool>,
    suspended: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(cfg: Config, link: Arc<Link>, queue: Arc<MissionQueue>, devices: Arc<Devices>) -> Self {
        Self {
            cfg,
            link,
            queue,
            devices,
            executing: Arc::new(AtomicBool::new(false)),
            suspended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn executing_flag(&self) -> Arc<AtomicBool> {
        self.executing.clone()
    }

    pub fn suspended_flag(&self) -> Arc<AtomicBool> {
        self.suspended.clone()
    }

    /// Idle/Executing loop. Never returns under normal operation.
    pub async fn run(&self) {
        let (finished_tx, mut finished_rx) = mpsc::channel::<u16>(1);
        loop {
            let Some(mission) = self.queue.pop() else {
                let got = self
                    .link
                    .request_missions(
                        self.cfg.batch_size,
                        Duration::from_millis(self.cfg.slot_wait_ms),
                    )
                    .await;
                if got == 0 {
                    debug!(backoff_ms = self.cfg.backoff_ms, "nothing to do, backing off");
                    sleep(Duration::from_millis(self.cfg.backoff_ms)).await;
                }
                continue;
            };

            self.executing.store(true, Ordering::SeqCst);
            let task = {
                let cfg = self.cfg.clone();
                let link = self.link.clone();
                let devices = self.devices.clone();
                let suspended = self.suspended.clone();
                let finished_tx = finished_tx.clone();
                tokio::spawn(async move {
                    let id = mission.mission_id;
                    execute_mission(&cfg, &link, &devices, &suspended, mission).await;
                    let _ = finished_tx.send(id).await;
                })
            };

            // Single active mission: nothing else is considered until the
            // mission task is over, finished event or not.
            if let Some(id) = wait_for_finish(task, &mut finished_rx).await {
                debug!(mission = id, "back to idle");
            }
            self.executing.store(false, Ordering::SeqCst);
        }
    }
}

/// Wait out one mission task. A task that dies without sending its finished
/// event (a panic) must not wedge the manager loop, so the join handle is
/// watched alongside the channel.
async fn wait_for_finish(
    mut task: tokio::task::JoinHandle<()>,
    finished_rx: &mut mpsc::Receiver<u16>,
) -> Option<u16> {
    tokio::select! {
        joined = &mut task => {
            if let Err(e) = joined {
                warn!(%e, "mission task failed");
            }
            // The finished event may have landed just before the task ended.
            finished_rx.try_recv().ok()
        }
        finished = finished_rx.recv() => {
            let _ = task.await;
            finished
        }
    }
}

pub async fn execute_mission(
    cfg: &Config,
    link: &Link,
    devices: &Arc<Devices>,
    suspended: &AtomicBool,
    mission: MissionPayload,
) {
    info!(
        mission = mission.mission_id,
        task = %mission.task_type,
        duration = mission.duration_secs,
        "mission starting"
    );

    let mut source = match ReportSource::new(
        devices.clone(),
        mission.mission_id,
        mission.task_type,
        cfg.camera_chunk_bytes,
        cfg.install_base_chance,
    ) {
        Ok(source) => source,
        Err(e) => {
            // Media never loaded: the mission is abandoned with no reports.
            warn!(mission = mission.mission_id, %e, "aborting mission");
            return;
        }
    };

    let tuning = MotionTuning {
        max_speed: cfg.max_speed,
        drain_per_unit: cfg.move_drain_per_unit,
        arrival_threshold: cfg.arrival_threshold,
    };
    move_to(&*devices.gps, &*devices.battery, mission.coordinate, &tuning).await;

    let deadline = sleep(Duration::from_secs(u64::from(mission.duration_secs)));
    tokio::pin!(deadline);
    let report_period = Duration::from_secs(u64::from(mission.update_freq_secs.max(1)));
    let mut report_tick = interval_at(Instant::now() + report_period, report_period);
    let battery_period = Duration::from_secs(cfg.battery_check_secs.max(1));
    let mut battery_tick = interval_at(Instant::now() + battery_period, battery_period);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = report_tick.tick(), if mission.update_freq_secs > 0 => {
                let report = source.next_report(false);
                if let Err(e) = link.send_report(&report).await {
                    warn!(mission = mission.mission_id, %e, "progress report lost");
                }
            }
            _ = battery_tick.tick() => {
                if devices.battery.level() <= cfg.battery_critical_pct {
                    warn!(
                        mission = mission.mission_id,
                        level = devices.battery.level(),
                        "critical battery, suspending"
                    );
                    suspended.store(true, Ordering::SeqCst);
                    if let Some(recharge) = &devices.recharge {
                        recharge.recharge_to(cfg.battery_recharge_target).await;
                    }
                    suspended.store(false, Ordering::SeqCst);
                    info!(mission = mission.mission_id, "resuming after recharge");
                }
            }
        }
    }

    let report = source.next_report(true);
    if let Err(e) = link.send_report(&report).await {
        warn!(mission = mission.mission_id, %e, "final report lost");
    }
    devices.battery.drain(cfg.task_battery_cost);
    info!(
        mission = mission.mission_id,
        battery = devices.battery.level(),
        "mission complete"
    );
}

/// Background watchdog: logs low charge and recharges a critical battery
/// while the rover is idle. In-mission suspension is handled by the
/// execution loop itself.
pub fn spawn_battery_monitor(
    cfg: &Config,
    devices: &Arc<Devices>,
    executing: Arc<AtomicBool>,
    suspended: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let cfg = cfg.clone();
    let devices = devices.clone();
    tokio::spawn(async move {
        let period = Duration::from_secs(cfg.battery_check_secs.max(1));
        loop {
            sleep(period).await;
            let level = devices.battery.level();
            if level <= cfg.battery_low_pct {
                warn!(level, "battery low");
            }
            if level <= cfg.battery_critical_pct && !executing.load(Ordering::SeqCst) {
                suspended.store(true, Ordering::SeqCst);
                if let Some(recharge) = &devices.recharge {
                    let reached = recharge.recharge_to(cfg.battery_recharge_target).await;
                    info!(level = reached, "idle recharge complete");
                }
                suspended.store(false, Ordering::SeqCst);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::sim::{SimAnalyzer, SimBattery, SimCamera, SimGps, SimThermometer};
    use fleet_protocol::mission::{Coordinate, TaskType};
    use fleet_protocol::packet::{MsgType, Packet};
    use fleet_protocol::report::Report;
    use fleet_protocol::send::RetryPolicy;
    use fleet_protocol::{COORDINATOR_ID, MAX_DATAGRAM};
    use clap::Parser;
    use parking_lot::Mutex;
    use tokio::net::UdpSocket;

    fn test_config() -> Config {
        let cli = crate::config::Cli::parse_from([
            "rover",
            "--rover-id", "7",
            "--max-speed", "1.0",
            "--battery-check-secs", "1",
        ]);
        crate::config::Cli::build(cli).unwrap()
    }

    fn test_devices(battery_level: f64) -> Arc<Devices> {
        let battery = Arc::new(SimBattery::new(battery_level, 50.0));
        Arc::new(Devices {
            battery: battery.clone(),
            recharge: Some(battery),
            gps: Arc::new(SimGps::new(Coordinate::default())),
            camera: Arc::new(SimCamera::new(64, 0.0)),
            analyzer: Arc::new(SimAnalyzer),
            thermometer: Arc::new(SimThermometer),
        })
    }

    /// Coordinator double: acks every report and records it.
    fn spawn_acking_coordinator(socket: UdpSocket) -> Arc<Mutex<Vec<Report>>> {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let seen = reports.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let Ok((n, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Ok(pkt) = Packet::decode(&buf[..n]) else {
                    continue;
                };
                if pkt.msg_type != MsgType::Report {
                    continue;
                }
                let ack = Packet::pure_ack(COORDINATOR_ID, pkt.seq.wrapping_add(1));
                let _ = socket.send_to(&ack.encode(), from).await;
                if let Ok(report) = Report::decode(&pkt.payload) {
                    seen.lock().push(report);
                }
            }
        });
        reports
    }

    async fn loopback_link() -> (Arc<Link>, Arc<Mutex<Vec<Report>>>) {
        let coordinator = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let coordinator_addr = coordinator.local_addr().unwrap();
        let reports = spawn_acking_coordinator(coordinator);

        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let link = Link::new(
            socket,
            coordinator_addr,
            7,
            Arc::new(MissionQueue::new()),
            RetryPolicy::default(),
        );
        link.spawn_receiver();
        (link, reports)
    }

    #[tokio::test]
    async fn short_mission_reports_progress_then_final() {
        let cfg = test_config();
        let devices = test_devices(100.0);
        let (link, reports) = loopback_link().await;
        let suspended = AtomicBool::new(false);

        let mission = MissionPayload {
            mission_id: 31,
            coordinate: Coordinate::default(),
            task_type: TaskType::EnvAnalysis,
            duration_secs: 2,
            update_freq_secs: 1,
            priority: 1,
        };
        execute_mission(&cfg, &link, &devices, &suspended, mission).await;

        let seen = reports.lock();
        assert!(seen.len() >= 2, "progress plus final, got {}", seen.len());
        assert!(seen.iter().rev().skip(1).all(|r| !r.is_last));
        let last = seen.last().unwrap();
        assert!(last.is_last);
        assert_eq!(last.mission_id, 31);
        // Fixed task cost came off the battery at completion.
        assert!(devices.battery.level() <= 100.0 - cfg.task_battery_cost);
    }

    #[tokio::test]
    async fn zero_update_frequency_sends_only_the_final_report() {
        let cfg = test_config();
        let devices = test_devices(100.0);
        let (link, reports) = loopback_link().await;
        let suspended = AtomicBool::new(false);

        let mission = MissionPayload {
            mission_id: 8,
            coordinate: Coordinate::default(),
            task_type: TaskType::Installation,
            duration_secs: 2,
            update_freq_secs: 0,
            priority: 2,
        };
        execute_mission(&cfg, &link, &devices, &suspended, mission).await;

        let seen = reports.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_last);
    }

    #[tokio::test]
    async fn failed_image_load_sends_nothing() {
        let cfg = test_config();
        let battery = Arc::new(SimBattery::new(100.0, 1.0));
        let devices = Arc::new(Devices {
            battery: battery.clone(),
            recharge: Some(battery),
            gps: Arc::new(SimGps::new(Coordinate::default())),
            camera: Arc::new(SimCamera::new(64, 1.0)),
            analyzer: Arc::new(SimAnalyzer),
            thermometer: Arc::new(SimThermometer),
        });
        let (link, reports) = loopback_link().await;
        let suspended = AtomicBool::new(false);

        let mission = MissionPayload {
            mission_id: 5,
            coordinate: Coordinate::default(),
            task_type: TaskType::ImageCapture,
            duration_secs: 1,
            update_freq_secs: 1,
            priority: 1,
        };
        execute_mission(&cfg, &link, &devices, &suspended, mission).await;
        assert!(reports.lock().is_empty());
    }

    #[tokio::test]
    async fn panicking_mission_task_does_not_wedge_the_manager() {
        let (finished_tx, mut finished_rx) = mpsc::channel::<u16>(1);

        let task = tokio::spawn(async move {
            let _keep = finished_tx;
            panic!("mission blew up");
        });
        let finished = tokio::time::timeout(
            Duration::from_secs(1),
            wait_for_finish(task, &mut finished_rx),
        )
        .await
        .expect("manager must not block on a dead mission");
        assert_eq!(finished, None);

        // The normal path still reports the mission id.
        let (finished_tx, mut finished_rx) = mpsc::channel::<u16>(1);
        let task = tokio::spawn(async move {
            let _ = finished_tx.send(77).await;
        });
        assert_eq!(wait_for_finish(task, &mut finished_rx).await, Some(77));
    }

    #[tokio::test]
    async fn critical_battery_suspends_and_recharges_mid_mission() {
        let mut cfg = test_config();
        cfg.battery_recharge_target = 60.0;
        // Start below the critical threshold so the first battery check
        // triggers the suspend path.
        let devices = test_devices(cfg.battery_critical_pct - 1.0);
        let (link, reports) = loopback_link().await;
        let suspended = AtomicBool::new(false);

        let mission = MissionPayload {
            mission_id: 12,
            coordinate: Coordinate::default(),
            task_type: TaskType::EnvAnalysis,
            duration_secs: 2,
            update_freq_secs: 0,
            priority: 1,
        };
        execute_mission(&cfg, &link, &devices, &suspended, mission).await;

        // Recharged past the target, minus the completion cost.
        assert!(devices.battery.level() >= cfg.battery_recharge_target - cfg.task_battery_cost);
        assert!(!suspended.load(Ordering::SeqCst));
        assert_eq!(reports.lock().len(), 1);
    }
}
