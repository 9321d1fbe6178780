//! Command channel behaviour: telemetry snapshots, overrides, CRUD,
//! guards and error replies.

use serde_json::json;

use crate::mock_hw::Rig;

#[test]
fn data_returns_full_snapshot() {
    let rig = Rig::new();
    rig.bring_up();
    let mut cycle = 0;
    rig.read_cycle(&mut cycle);

    let reply = rig.dispatch(r#"{"command": "Data", "data": {}}"#);
    assert_eq!(reply["success"], true);

    let data = &reply["data"];
    assert_eq!(data["temp"], 20.0);
    assert_eq!(data["targetTemp"], 0.0);
    assert_eq!(data["status"], "Idle");
    assert_eq!(data["stirStatus"], "Disabled");
    assert_eq!(data["boostStatus"], 0);
    assert_eq!(data["inOverTime"], false);
    assert_eq!(data["powerUsage"], 0);
    assert!(data["manualOverrideOutput"].is_null());
    assert!(data["manualOverrideTargetTemp"].is_null());

    let temps = data["temps"].as_array().unwrap();
    assert_eq!(temps.len(), 1);
    assert_eq!(temps[0]["sensor"], (0xAA01u64).to_string());
    assert_eq!(temps[0]["temp"], 20.0);
}

#[test]
fn data_serves_temp_log_increments() {
    let rig = Rig::new();
    rig.bring_up();
    {
        let mut log = rig.engine.temp_log.lock().unwrap();
        log.push(1_700_000_100, 20);
        log.push(1_700_000_200, 25);
        log.push(1_700_000_300, 30);
    }

    let reply = rig.dispatch(r#"{"command": "Data", "data": {}}"#);
    let full = reply["data"]["tempLog"].as_array().unwrap().clone();
    assert_eq!(full.len(), 3);
    // Newest first.
    assert_eq!(full[0]["time"], 1_700_000_300i64);
    assert_eq!(reply["data"]["lastLogDateTime"], 1_700_000_300i64);

    let reply = rig.dispatch(
        r#"{"command": "Data", "data": {"lastDate": 1700000200}}"#,
    );
    let delta = reply["data"]["tempLog"].as_array().unwrap().clone();
    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0]["temp"], 30);
}

#[test]
fn set_temp_drives_free_run_target() {
    let rig = Rig::new();
    rig.bring_up();

    let reply = rig.dispatch(r#"{"command": "SetTemp", "data": {"targetTemp": 65.5}}"#);
    assert_eq!(reply["success"], true);
    assert_eq!(rig.engine.override_target(), Some(65.5));
    assert_eq!(rig.engine.target_temperature(), 65.5);

    let reply = rig.dispatch(r#"{"command": "SetTemp", "data": {"targetTemp": null}}"#);
    assert_eq!(reply["success"], true);
    assert_eq!(rig.engine.override_target(), None);
    assert_eq!(rig.engine.target_temperature(), 0.0);

    let reply = rig.dispatch(r#"{"command": "SetTemp", "data": {"targetTemp": "hot"}}"#);
    assert_eq!(reply["success"], false);
    assert_eq!(reply["message"], "Incorrect data, integer or float expected!");
}

#[test]
fn set_override_output_flags_pid_reset() {
    let rig = Rig::new();
    rig.bring_up();

    rig.dispatch(r#"{"command": "SetOverrideOutput", "data": {"output": 50}}"#);
    assert_eq!(rig.engine.override_output(), Some(50));
    assert!(rig.engine.take_pid_reset());

    rig.dispatch(r#"{"command": "SetOverrideOutput", "data": {"output": null}}"#);
    assert_eq!(rig.engine.override_output(), None);
    assert!(rig.engine.take_pid_reset());
}

#[test]
fn schedule_crud_round_trip() {
    let rig = Rig::new();
    rig.bring_up();

    let reply = rig.dispatch(r#"{"command": "GetMashSchedules", "data": {}}"#);
    let names: Vec<String> = reply["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"Default".to_string()));
    assert!(names.contains(&"Rye Mash".to_string()));
    assert!(names.contains(&"Boil 70 Min".to_string()));

    let save = json!({
        "command": "SaveMashSchedule",
        "data": {
            "name": "Pils",
            "boil": false,
            "steps": [
                {"index": 0, "name": "Main", "temperature": 66.0,
                 "stepTime": 10, "time": 60, "allowBoost": true,
                 "extendStepTimeIfNeeded": true}
            ],
            "notifications": [
                {"name": "Iodine test", "message": "Check conversion",
                 "timeFromStart": 40, "refStepIndex": 0, "buzzer": true}
            ]
        }
    });
    let reply = rig.dispatch(&save.to_string());
    assert_eq!(reply["success"], true);

    // Persisted: a fresh engine sees it after loading from the store.
    let fresh = brewctl::Engine::with_drain_delay(std::time::Duration::ZERO);
    brewctl::persist::load_all(&fresh, rig.board.storage.as_ref());
    {
        let schedules = fresh.schedules.lock().unwrap();
        let pils = schedules.get("Pils").expect("persisted schedule");
        assert_eq!(pils.notifications[0].time_absolute, 40);
    }

    let reply = rig.dispatch(r#"{"command": "DeleteMashSchedule", "data": {"name": "Pils"}}"#);
    assert_eq!(reply["success"], true);
    let reply = rig.dispatch(r#"{"command": "DeleteMashSchedule", "data": {"name": "Pils"}}"#);
    assert_eq!(reply["success"], false);
    assert_eq!(reply["message"], "Schedule with name: Pils not found");
}

#[test]
fn imported_schedule_stays_temporary() {
    let rig = Rig::new();
    rig.bring_up();

    let import = json!({
        "command": "SetMashSchedule",
        "data": {
            "name": "Imported",
            "boil": false,
            "steps": [
                {"index": 0, "name": "Only", "temperature": 62.0,
                 "stepTime": 5, "time": 30}
            ],
            "notifications": []
        }
    });
    assert_eq!(rig.dispatch(&import.to_string())["success"], true);

    // Visible on the channel…
    let reply = rig.dispatch(r#"{"command": "GetMashSchedules", "data": {}}"#);
    assert!(reply["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s["name"] == "Imported"));

    // …but never persisted.
    let fresh = brewctl::Engine::with_drain_delay(std::time::Duration::ZERO);
    brewctl::persist::load_all(&fresh, rig.board.storage.as_ref());
    assert!(!fresh.schedules.lock().unwrap().contains_key("Imported"));
}

#[test]
fn pid_settings_validate_on_save() {
    let rig = Rig::new();
    rig.bring_up();

    let reply = rig.dispatch(r#"{"command": "GetPIDSettings", "data": {}}"#);
    assert_eq!(reply["data"]["pidLoopTime"], 60);

    let save = json!({
        "command": "SavePIDSettings",
        "data": {
            "kP": 12.5, "kI": 2.0, "kD": 4.0,
            "boilkP": 30.0, "boilkI": 1.0, "boilkD": 8.0,
            "pidLoopTime": 30, "stepInterval": 30,
            "boostModeUntil": 80, "heaterLimit": 90,
            "heaterCycles": 3, "relayGuard": 10
        }
    });
    assert_eq!(rig.dispatch(&save.to_string())["success"], true);
    {
        let settings = rig.engine.pid_settings.lock().unwrap();
        assert_eq!(settings.pid_loop_time, 30);
        assert_eq!(settings.heater_limit, 90);
        assert!((settings.mash_kp - 12.5).abs() < 0.01);
    }

    let mut bad = save.clone();
    bad["data"]["relayGuard"] = json!(80);
    let reply = rig.dispatch(&bad.to_string());
    assert_eq!(reply["success"], false);
    // The previous settings stay in force.
    assert_eq!(rig.engine.pid_settings.lock().unwrap().relay_guard, 10);
}

#[test]
fn heater_settings_refused_while_running() {
    let rig = Rig::new();
    rig.bring_up();

    // Free run (no schedule) still counts as a running control.
    rig.dispatch(r#"{"command": "Start", "data": {"selectedMashSchedule": null}}"#);
    assert!(rig.engine.control_run());

    let save = json!({
        "command": "SaveHeaterSettings",
        "data": [
            {"name": "Big", "pinNr": 26, "preference": 2, "watt": 3000,
             "useForMash": true, "useForBoil": true},
            {"name": "Small", "pinNr": 27, "preference": 1, "watt": 1000,
             "useForMash": true, "useForBoil": false}
        ]
    });
    let reply = rig.dispatch(&save.to_string());
    assert_eq!(reply["success"], false);
    assert_eq!(reply["message"], "You cannot save heater settings while running!");

    rig.dispatch(r#"{"command": "Stop", "data": {}}"#);
    let reply = rig.dispatch(&save.to_string());
    assert_eq!(reply["success"], true);

    // Renumbered 1..N and sorted by preference.
    let reply = rig.dispatch(r#"{"command": "GetHeaterSettings", "data": {}}"#);
    let heaters = reply["data"].as_array().unwrap().clone();
    assert_eq!(heaters.len(), 2);
    assert_eq!(heaters[0]["name"], "Small");
    assert_eq!(heaters[0]["preference"], 1);
    assert_eq!(heaters[1]["name"], "Big");

    let ids: Vec<u64> = heaters.iter().map(|h| h["id"].as_u64().unwrap()).collect();
    assert!(ids.contains(&1) && ids.contains(&2));
}

#[test]
fn temp_settings_update_and_prune() {
    let rig = Rig::new();
    rig.bring_up();

    let id = (0xAA01u64).to_string();
    let save = json!({
        "command": "SaveTempSettings",
        "data": [{
            "id": id,
            "name": "Kettle bottom",
            "color": "#ff0000",
            "useForControl": false,
            "show": false,
            "compensateAbsolute": -0.5,
            "compensateRelative": 1.02
        }]
    });
    assert_eq!(rig.dispatch(&save.to_string())["success"], true);
    {
        let sensors = rig.engine.sensors.lock().unwrap();
        let probe = &sensors[&0xAA01];
        assert_eq!(probe.name, "Kettle bottom");
        assert!(!probe.use_for_control);
        assert!((probe.compensate_absolute + 0.5).abs() < 0.001);
    }

    // An empty list prunes every probe.
    let reply = rig.dispatch(r#"{"command": "SaveTempSettings", "data": []}"#);
    assert_eq!(reply["success"], true);
    assert!(rig.engine.sensors.lock().unwrap().is_empty());

    // And a non-array payload is refused.
    let reply = rig.dispatch(r#"{"command": "SaveTempSettings", "data": 5}"#);
    assert_eq!(reply["success"], false);
}

#[test]
fn failed_probe_rejoins_after_detect() {
    let rig = Rig::new();
    rig.bring_up();
    let mut cycle = 0;

    rig.probe_bus.set_failing(0xAA01, true);
    rig.read_cycle(&mut cycle);
    assert!(!rig.engine.sensors.lock().unwrap()[&0xAA01].connected);

    rig.probe_bus.set_failing(0xAA01, false);
    rig.dispatch(r#"{"command": "DetectTempSensors", "data": {}}"#);
    assert!(rig.engine.sensors.lock().unwrap()[&0xAA01].connected);

    rig.read_cycle(&mut cycle);
    assert!((rig.engine.temperature() - 20.0).abs() < 0.001);
}

#[test]
fn system_settings_merge_and_request_reboot() {
    let rig = Rig::new();
    rig.bring_up();

    let save = json!({
        "command": "SaveSystemSettings",
        "data": {
            "stirPin": 21,
            "invertOutputs": true,
            "mqttUri": "mqtt://broker.local",
            "temperatureScale": 1,
            "speaker2Pin": 19
        }
    });
    let reply = rig.dispatch(&save.to_string());
    assert_eq!(reply["success"], true);
    assert_eq!(reply["message"], "Please restart device for changes to have effect!");

    let reply = rig.dispatch(r#"{"command": "GetSystemSettings", "data": {}}"#);
    let data = &reply["data"];
    assert_eq!(data["stirPin"], 21);
    assert_eq!(data["invertOutputs"], true);
    assert_eq!(data["mqttUri"], "mqtt://broker.local");
    assert_eq!(data["temperatureScale"], 1);
    assert_eq!(data["speaker2Pin"], 19);
    // Untouched fields keep their previous values.
    assert_eq!(data["buzzerTime"], 2);
}

#[test]
fn factory_reset_wipes_store_and_reboots() {
    let rig = Rig::new();
    rig.bring_up();
    assert!(rig.board.storage.exists("mashschedules"));

    let reply = rig.dispatch(r#"{"command": "FactoryReset", "data": {}}"#);
    assert_eq!(reply["success"], true);
    assert!(!rig.board.storage.exists("mashschedules"));
    assert_eq!(*rig.platform.reboots.lock().unwrap(), 1);
}

#[test]
fn recovery_boot_reports_and_reboots() {
    let rig = Rig::new();
    let reply = rig.dispatch(r#"{"command": "BootIntoRecovery", "data": {}}"#);
    assert_eq!(reply["success"], true);
    assert_eq!(reply["message"], "Device is booting into recovery hold on!");
    assert_eq!(*rig.platform.reboots.lock().unwrap(), 1);
}

#[test]
fn malformed_requests_fail_closed() {
    let rig = Rig::new();

    let reply = rig.dispatch("not json");
    assert_eq!(reply["success"], false);

    let reply = rig.dispatch(r#"{"data": {}}"#);
    assert_eq!(reply["success"], false);

    let reply = rig.dispatch(r#"{"command": "MakeCoffee", "data": {}}"#);
    assert_eq!(reply["success"], false);
    assert_eq!(reply["message"], "Unknown command: MakeCoffee");
}

#[test]
fn stir_requires_configured_pin() {
    let rig = Rig::new();
    rig.bring_up();

    // Default settings have no stir pin: commands are ignored.
    rig.dispatch(r#"{"command": "StartStir", "data": {"max": 10, "intervalStart": 0, "intervalStop": 5}}"#);
    assert!(!rig.engine.stir_run());

    // Configure a pin, then the cycler starts.
    rig.engine.settings.lock().unwrap().stir_pin = 21;
    rig.dispatch(r#"{"command": "StartStir", "data": {"max": 10, "intervalStart": 0, "intervalStop": 5}}"#);
    assert!(rig.engine.stir_run());
    assert_eq!(rig.engine.stir_status_text(), "Running");
    {
        let stir = rig.engine.stir.lock().unwrap();
        assert_eq!(stir.time_span_min, 10);
        assert_eq!(stir.interval_stop_min, 5);
    }

    rig.dispatch(r#"{"command": "StopStir", "data": {}}"#);
    assert!(!rig.engine.stir_run());
    assert_eq!(rig.engine.stir_status_text(), "Idle");
    // The pin is forced to the off level immediately.
    assert_eq!(rig.outputs.level(21), Some(false));
}
