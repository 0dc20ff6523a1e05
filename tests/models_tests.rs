// Model serialization tests (JSON camelCase, unavailable as null)

use sysmon::models::*;

fn snapshot() -> Snapshot {
    Snapshot {
        tick: 3,
        timestamp: 1_700_000_000_000,
        uptime_secs: Some(42.0),
        cpu: CpuStats {
            usage_percent: Some(12.5),
            per_core_percent: vec![Some(10.0), None],
            frequency_mhz: vec![Some(2400.0), None],
            iowait_percent: Some(0.5),
            temperature_celsius: None,
            load: Some(LoadAverages {
                one: 0.1,
                five: 0.2,
                fifteen: 0.3,
            }),
        },
        memory: Some(MemoryStats {
            total: 1024,
            used: 512,
            available: 512,
            used_percent: 50.0,
            ..MemoryStats::default()
        }),
        swap: Some(SwapStats::NoSwap),
        storage: StorageStats::default(),
        network: NetworkStats {
            interfaces: vec![InterfaceStats {
                name: "eth0".into(),
                traffic: None,
            }],
            active_connections: Some(7),
        },
        processes: ProcessStats {
            top: vec![ProcessSample {
                pid: 1,
                name: "init".into(),
                state: ProcessState::DiskSleep,
                memory_mb: 12.0,
                cpu_percent: Some(0.0),
                disk_io_bytes: None,
                disk_io_mb_per_sec: None,
                fd_count: Some(9),
            }],
            held: false,
            state_counts: None,
        },
        context_switches_per_sec: None,
        file_descriptors: Some(FileDescriptorStats::new(100, 1000)),
        battery: None,
    }
}

#[test]
fn test_snapshot_serializes_camel_case() {
    let json = serde_json::to_string(&snapshot()).unwrap();
    assert!(json.contains("\"uptimeSecs\":42.0"));
    assert!(json.contains("\"usagePercent\":12.5"));
    assert!(json.contains("\"perCorePercent\":[10.0,null]"));
    assert!(json.contains("\"activeConnections\":7"));
    assert!(json.contains("\"memoryMb\":12.0"));
    assert!(json.contains("\"state\":\"diskSleep\""));
}

#[test]
fn test_unavailable_fields_are_null() {
    let value = serde_json::to_value(snapshot()).unwrap();
    assert!(value["battery"].is_null());
    assert!(value["contextSwitchesPerSec"].is_null());
    assert!(value["cpu"]["temperatureCelsius"].is_null());
    assert!(value["network"]["interfaces"][0]["traffic"].is_null());
    assert!(value["processes"]["top"][0]["diskIoBytes"].is_null());
}

#[test]
fn test_snapshot_json_roundtrip() {
    let s = snapshot();
    let json = serde_json::to_string(&s).unwrap();
    let back: Snapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, s);
}

#[test]
fn test_swap_status_tag() {
    let json = serde_json::to_string(&SwapStats::NoSwap).unwrap();
    assert!(json.contains("noSwap"));
    let active = SwapStats::from_kb(1000, 250);
    match active {
        SwapStats::Active {
            total,
            used,
            used_percent,
        } => {
            assert_eq!(total, 1000 * 1024);
            assert_eq!(used, 750 * 1024);
            assert_eq!(used_percent, 75.0);
        }
        SwapStats::NoSwap => panic!("expected active swap"),
    }
}

#[test]
fn test_process_state_codes() {
    assert_eq!(ProcessState::from_code('R'), ProcessState::Running);
    assert_eq!(ProcessState::from_code('t'), ProcessState::Stopped);
    assert_eq!(ProcessState::from_code('Z'), ProcessState::Zombie);
    assert_eq!(ProcessState::from_code('?'), ProcessState::Unknown);

    let mut counts = ProcessStateCounts::default();
    for s in [
        ProcessState::Running,
        ProcessState::Sleeping,
        ProcessState::DiskSleep,
        ProcessState::Idle,
        ProcessState::Zombie,
        ProcessState::Unknown,
    ] {
        counts.record(s);
    }
    assert_eq!(counts.sleeping, 3);
    assert_eq!(counts.total, 6);

    let json = serde_json::to_value(counts).unwrap();
    assert_eq!(json["total"], 6);
    assert_eq!(json["zombie"], 1);
}

#[test]
fn test_fd_percent_unavailable_without_max() {
    assert_eq!(FileDescriptorStats::new(10, 0).used_percent, None);
    assert_eq!(FileDescriptorStats::new(10, 100).used_percent, Some(10.0));
}

#[test]
fn test_bytes_to_mbps() {
    assert_eq!(bytes_to_mbps(1_000_000.0), 8.0);
}
