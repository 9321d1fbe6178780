//! Schedule runs end to end: compile shapes, notification timing,
//! overtime re-planning, free-run boil detection.

use serde_json::json;

use brewctl::app::Clock;
use brewctl::run::ScheduleRunner;

use crate::mock_hw::Rig;

/// Let the short-lived loop threads spawned by `Start` wind down
/// (the rigs never set the process-wide run flag, so they exit on
/// their first check).
fn settle() {
    std::thread::sleep(std::time::Duration::from_millis(20));
}

#[test]
fn default_mash_compiles_against_now() {
    let rig = Rig::new();
    rig.bring_up();
    let mut cycle = 0;
    rig.read_cycle(&mut cycle); // fuse 20 °C

    let start = rig.clock.now();
    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": "Default"}}"#);
    settle();

    assert!(rig.engine.control_run());
    assert!(!rig.engine.boil_run());

    {
        let plan = rig.engine.plan.lock().unwrap();
        // Anchor plus ramp+hold per step.
        assert_eq!(plan.steps.len(), 7);
        assert_eq!(plan.steps[0].time, start);
        assert_eq!(plan.steps[0].temperature, 20.0);
        // Beta Amylase: 5 min ramp to 64 °C, 45 min hold.
        assert_eq!(plan.steps[1].time, start + 5 * 60);
        assert_eq!(plan.steps[1].temperature, 64.0);
        assert!(plan.steps[1].allow_boost);
        assert_eq!(plan.steps[2].time, start + 50 * 60);
        // Whole program: 85 minutes.
        assert_eq!(plan.steps[6].time, start + 85 * 60);

        // "Add Grains" fires 5 minutes in.
        let grains = &plan.notifications[0];
        assert_eq!(grains.name, "Add Grains");
        assert_eq!(grains.time_point, start + 5 * 60);
    }

    let reply = rig.dispatch(r#"{"command": "GetRunningSchedule", "data": {}}"#);
    let data = &reply["data"];
    assert_eq!(data["version"], 1);
    assert_eq!(data["steps"].as_array().unwrap().len(), 7);
    let notifications = data["notifications"].as_array().unwrap();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0]["name"], "Add Grains");
    assert_eq!(notifications[0]["done"], false);
    assert_eq!(
        notifications[0]["timePoint"].as_i64().unwrap(),
        start + 5 * 60
    );
}

#[test]
fn add_grains_fires_five_minutes_in() {
    let rig = Rig::new();
    rig.bring_up();
    let mut cycle = 0;
    rig.read_cycle(&mut cycle);

    let start = rig.clock.now();
    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": "Default"}}"#);
    settle();

    let mut runner = ScheduleRunner::new();
    let tick = |runner: &mut ScheduleRunner, now: i64| {
        runner.tick(
            &rig.engine,
            rig.annunciator.as_ref(),
            rig.telemetry.as_ref(),
            now,
        )
    };

    tick(&mut runner, start); // past the anchor
    tick(&mut runner, start + 299);
    assert!(rig.annunciator.buzzes.lock().unwrap().is_empty());
    tick(&mut runner, start + 300);
    assert_eq!(rig.annunciator.buzzes.lock().unwrap().len(), 1);
}

#[test]
fn boil_schedule_sets_boil_mode() {
    let rig = Rig::new();
    rig.bring_up();
    let mut cycle = 0;
    rig.read_cycle(&mut cycle);

    let start = rig.clock.now();
    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": "Boil 70 Min"}}"#);
    settle();

    assert!(rig.engine.boil_run());
    {
        let plan = rig.engine.plan.lock().unwrap();
        // Zero-length ramp straight to 101 °C, 70 min hold.
        assert_eq!(plan.steps[1].time, start);
        assert_eq!(plan.steps[1].temperature, 101.0);
        assert_eq!(plan.steps[2].time, start + 70 * 60);

        let aroma = plan
            .notifications
            .iter()
            .find(|n| n.name == "Aroma Hops")
            .unwrap();
        assert_eq!(aroma.time_point, start + 55 * 60);
    }
}

#[test]
fn overtime_shifts_plan_until_target_reached() {
    let rig = Rig::new();
    rig.bring_up();
    let mut cycle = 0;
    rig.read_cycle(&mut cycle);

    // 5-minute extendable ramp to 70 °C with a notification pinned to
    // the scheduled end.
    let save = json!({
        "command": "SaveMashSchedule",
        "data": {
            "name": "Stubborn",
            "boil": false,
            "steps": [
                {"index": 0, "name": "Ramp", "temperature": 70.0,
                 "stepTime": 5, "time": 10,
                 "extendStepTimeIfNeeded": true}
            ],
            "notifications": [
                {"name": "At end", "message": "", "timeFromStart": 5,
                 "refStepIndex": 0, "buzzer": true}
            ]
        }
    });
    assert_eq!(rig.dispatch(&save.to_string())["success"], true);

    let start = rig.clock.now();
    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": "Stubborn"}}"#);
    settle();
    let version_after_compile = rig.engine.running_version();

    let mut runner = ScheduleRunner::new();
    let mut tick = |runner: &mut ScheduleRunner, now: i64| {
        runner.tick(
            &rig.engine,
            rig.annunciator.as_ref(),
            rig.telemetry.as_ref(),
            now,
        )
    };

    tick(&mut runner, start);
    // Pin the probe 5 °C short of target for the whole ramp.
    rig.probe_bus.set_temperature(0xAA01, 65.0);
    rig.read_cycle(&mut cycle);

    // Overtime arms inside the trigger window…
    tick(&mut runner, start + 297);
    assert!(rig.engine.in_over_time());

    // …and every time the (shifted) end passes unreached, the whole
    // tail moves another 30 s.
    let outcome = tick(&mut runner, start + 301);
    assert!(outcome.no_delay);
    {
        let plan = rig.engine.plan.lock().unwrap();
        assert_eq!(plan.steps[1].time, start + 330);
        assert_eq!(plan.notifications[0].time_point, start + 330);
    }
    assert_eq!(rig.engine.running_version(), version_after_compile + 1);

    let outcome = tick(&mut runner, start + 330);
    assert!(outcome.no_delay);
    {
        let plan = rig.engine.plan.lock().unwrap();
        assert_eq!(plan.steps[1].time, start + 360);
        assert_eq!(plan.steps[2].time, start + 960);
        assert_eq!(plan.notifications[0].time_point, start + 360);
    }
    assert_eq!(rig.engine.running_version(), version_after_compile + 2);
    // The end-of-ramp notification stayed quiet while suppressed.
    assert!(rig.annunciator.buzzes.lock().unwrap().is_empty());

    // The kettle finally catches up: overtime exits, the step
    // advances, and the suppressed notification fires.
    rig.probe_bus.set_temperature(0xAA01, 70.0);
    rig.read_cycle(&mut cycle);
    tick(&mut runner, start + 331); // latch target reached
    tick(&mut runner, start + 361); // past the shifted end
    assert!(!rig.engine.in_over_time());
    assert_eq!(rig.engine.running_version(), version_after_compile + 3);
    assert_eq!(rig.engine.current_mash_step(), 2);

    tick(&mut runner, start + 362);
    assert_eq!(rig.annunciator.buzzes.lock().unwrap().len(), 1);
}

#[test]
fn boost_transitions_reach_telemetry_log() {
    let rig = Rig::new();
    rig.bring_up();
    let mut cycle = 0;
    rig.read_cycle(&mut cycle);

    let save = json!({
        "command": "SaveMashSchedule",
        "data": {
            "name": "Boosted",
            "boil": false,
            "steps": [
                {"index": 0, "name": "Ramp", "temperature": 70.0,
                 "stepTime": 10, "time": 10, "allowBoost": true}
            ],
            "notifications": []
        }
    });
    rig.dispatch(&save.to_string());

    let start = rig.clock.now();
    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": "Boosted"}}"#);
    settle();

    let mut runner = ScheduleRunner::new();
    runner.tick(&rig.engine, rig.annunciator.as_ref(), rig.telemetry.as_ref(), start);
    runner.tick(
        &rig.engine,
        rig.annunciator.as_ref(),
        rig.telemetry.as_ref(),
        start + 120,
    );
    assert_eq!(rig.engine.boost_status(), brewctl::run::BoostStatus::Boost);

    rig.probe_bus.set_temperature(0xAA01, 69.5);
    rig.read_cycle(&mut cycle);
    runner.tick(
        &rig.engine,
        rig.annunciator.as_ref(),
        rig.telemetry.as_ref(),
        start + 240,
    );
    assert_eq!(rig.engine.boost_status(), brewctl::run::BoostStatus::Off);

    let lines = rig.telemetry.lines.lock().unwrap();
    assert_eq!(lines.as_slice(), ["Boost Start", "Boost End"]);
}

#[test]
fn free_run_infers_boil_from_target() {
    let rig = Rig::new();
    rig.bring_up();

    rig.dispatch(r#"{"command": "SetTemp", "data": {"targetTemp": 101}}"#);
    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": null}}"#);
    settle();
    assert!(rig.engine.boil_run());
    assert!(rig.engine.plan.lock().unwrap().steps.is_empty());

    rig.dispatch(r#"{"command": "Stop", "data": {}}"#);
    assert!(!rig.engine.control_run());

    // Below the boil threshold it is a plain mash-mode run.
    rig.dispatch(r#"{"command": "SetTemp", "data": {"targetTemp": 66}}"#);
    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": null}}"#);
    settle();
    assert!(!rig.engine.boil_run());
}

#[test]
fn starting_twice_is_a_no_op() {
    let rig = Rig::new();
    rig.bring_up();
    let mut cycle = 0;
    rig.read_cycle(&mut cycle);

    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": "Default"}}"#);
    settle();
    let version = rig.engine.running_version();

    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": "Default"}}"#);
    settle();
    // No recompile happened while the first run is still active.
    assert_eq!(rig.engine.running_version(), version);
}

#[test]
fn missing_schedule_terminates_on_first_tick() {
    let rig = Rig::new();
    rig.bring_up();

    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": "No Such"}}"#);
    settle();
    assert!(rig.engine.control_run());
    assert!(rig.engine.plan.lock().unwrap().steps.is_empty());

    let mut runner = ScheduleRunner::new();
    let outcome = runner.tick(
        &rig.engine,
        rig.annunciator.as_ref(),
        rig.telemetry.as_ref(),
        rig.clock.now(),
    );
    assert!(outcome.finished);
    assert!(!rig.engine.control_run());
}
