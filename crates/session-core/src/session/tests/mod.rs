//  Copyright (c) 2026 Metaform Systems, Inc
//
//  This program and the accompanying materials are made available under the
//  terms of the Apache License, Version 2.0 which is available at
//  https://www.apache.org/licenses/LICENSE-2.0
//
//  SPDX-License-Identifier: Apache-2.0
//
//  Contributors:
//       Metaform Systems, Inc. - initial API and implementation
//

use crate::session::{Role, UserProfile, UserRecord};
use rstest::rstest;
use serde_json::json;

#[rstest]
#[case(1, Role::Admin)]
#[case(2, Role::Admin)]
#[case(3, Role::Capturista)]
#[case(4, Role::Supervisor)]
#[case(5, Role::Consulta)]
#[case(42, Role::Consulta)]
fn test_role_from_id(#[case] id: i64, #[case] expected: Role) {
    assert_eq!(Role::from_id(id), expected);
}

#[test]
fn test_role_serializes_lowercase() {
    assert_eq!(serde_json::to_value(Role::Capturista).unwrap(), json!("capturista"));
    assert_eq!(Role::Supervisor.to_string(), "supervisor");
}

#[test]
fn test_profile_from_minimal_record() {
    let record: UserRecord = serde_json::from_value(json!({ "usuario_id": 7, "rol": 2 })).unwrap();
    let profile = UserProfile::from(record);

    assert_eq!(profile.id, 7);
    assert_eq!(profile.role, Role::Admin);
    assert_eq!(profile.role_id, 2);
    assert_eq!(profile.username, None);
    assert_eq!(profile.person, None);
}

#[test]
fn test_profile_from_record_with_aliases() {
    let record: UserRecord = serde_json::from_value(json!({
        "usuario_id": 11,
        "rol": 3,
        "username": "mlopez",
        "nombre": "María López",
        "correo": "mlopez@example.org",
        "activo": true
    }))
    .unwrap();
    assert_eq!(record.extra.get("activo"), Some(&json!(true)));

    let profile = UserProfile::from(record);
    assert_eq!(profile.username.as_deref(), Some("mlopez"));
    assert_eq!(profile.name.as_deref(), Some("María López"));
    assert_eq!(profile.email.as_deref(), Some("mlopez@example.org"));
    assert_eq!(profile.role, Role::Capturista);
}

#[test]
fn test_with_person_keeps_existing_when_absent() {
    let record: UserRecord = serde_json::from_value(json!({ "usuario_id": 1, "rol": 4 })).unwrap();
    let profile = UserProfile::from(record)
        .with_person(Some(json!({ "curp": "XEXX010101HNEXXXA4" })))
        .with_person(None)
        .with_work_schedule(Some(json!({ "turno": "matutino" })));

    assert_eq!(profile.person, Some(json!({ "curp": "XEXX010101HNEXXXA4" })));
    assert_eq!(profile.work_schedule, Some(json!({ "turno": "matutino" })));
}

#[test]
fn test_profile_round_trips_through_json() {
    let record: UserRecord = serde_json::from_value(json!({ "usuario_id": 3, "rol": 5 })).unwrap();
    let profile = UserProfile::from(record);
    let stored = serde_json::to_string(&profile).unwrap();
    let restored: UserProfile = serde_json::from_str(&stored).unwrap();
    assert_eq!(restored, profile);
}
