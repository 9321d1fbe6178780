//! One real-time smoke test: the actual task threads drive heaters
//! through GPIO for a couple of seconds.

use std::thread;
use std::time::Duration;

use crate::mock_hw::Rig;

#[test]
fn free_run_burns_heaters_then_stops_clean() {
    let rig = Rig::new();
    rig.bring_up();

    // Tight windows so the loops do real work within the test budget.
    {
        let mut settings = rig.engine.pid_settings.lock().unwrap();
        settings.pid_loop_time = 2;
        settings.heater_cycles = 1;
    }
    rig.engine.set_temperature(20.0);
    rig.engine.set_run(true);

    rig.dispatch(r#"{"command": "SetTemp", "data": {"targetTemp": 60}}"#);
    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": null}}"#);

    // 40 °C of error saturates the regulator: both factory heaters
    // should be burning and mirrored onto their pins.
    thread::sleep(Duration::from_millis(2500));
    {
        let heaters = rig.engine.heaters.lock().unwrap();
        assert!(heaters.iter().all(|h| h.enabled));
        assert!(heaters.iter().all(|h| h.burn_time == 100));
        assert!(heaters.iter().all(|h| h.burn));
    }
    assert_eq!(rig.engine.pid_output(), 100);
    assert_eq!(rig.outputs.level(32), Some(true));
    assert_eq!(rig.outputs.level(33), Some(true));

    let reply = rig.dispatch(r#"{"command": "Data", "data": {}}"#);
    assert_eq!(reply["data"]["output"], 100);
    assert_eq!(reply["data"]["status"], "Running");
    assert!(reply["data"]["powerUsage"].is_number());

    // Stop: loops drain and the mirror forces every pin off.
    rig.dispatch(r#"{"command": "Stop", "data": {}}"#);
    thread::sleep(Duration::from_millis(1500));
    assert_eq!(rig.outputs.level(32), Some(false));
    assert_eq!(rig.outputs.level(33), Some(false));
    assert_eq!(rig.engine.pid_output(), 0);

    rig.engine.set_run(false);
}
