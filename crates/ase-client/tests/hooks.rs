//! Out-of-band notifications reach registered hooks.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::{Arc, Mutex};

use ase_client::{CancellationToken, Config, HookRegistry};
use ase_protocol::{
    DoneStatus, Eed, EnvChange, EnvChangePackage, EnvChangeType, Package, RowFmt,
};
use ase_testing::MockReply;

use common::{connect_with, done, int_column, int_value, row, server};

fn database_change(old: &str, new: &str) -> Package {
    Package::EnvChange(EnvChangePackage::new(vec![EnvChange::new(
        EnvChangeType::Database,
        old,
        new,
    )]))
}

#[tokio::test]
async fn test_env_change_hook_fires_once_per_occurrence() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hooks = {
        let seen = Arc::clone(&seen);
        HookRegistry::builder()
            .on_env_change(EnvChangeType::Database, move |_, old, new| {
                seen.lock().unwrap().push((old.to_string(), new.to_string()));
            })
            .build()
    };

    let server = server(vec![
        MockReply::Packages(vec![
            database_change("master", "pubs2"),
            done(DoneStatus::FINAL, 0),
        ]),
        MockReply::Packages(vec![
            Package::RowFmt(RowFmt::new(vec![int_column("id")])),
            row(vec![int_value(1)]),
            database_change("pubs2", "tempdb"),
            row(vec![int_value(2)]),
            done(DoneStatus::FINAL | DoneStatus::COUNT, 2),
        ]),
    ])
    .await;
    let mut conn = connect_with(&server, Config::default(), hooks).await;
    let cancel = CancellationToken::new();

    conn.exec(&cancel, "use pubs2", &[]).await.unwrap();

    let mut rows = conn
        .exec(&cancel, "select id from t", &[])
        .await
        .unwrap()
        .rows
        .expect("cursor");
    let mut ids = Vec::new();
    while let Some(r) = rows.next_row(&cancel).await.unwrap() {
        ids.push(rows.get::<i32>(&r, 0).unwrap());
    }
    assert_eq!(ids, vec![1, 2]);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("master".to_string(), "pubs2".to_string()),
            ("pubs2".to_string(), "tempdb".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_env_change_hook_filters_by_type() {
    let fired = Arc::new(Mutex::new(0usize));
    let hooks = {
        let fired = Arc::clone(&fired);
        HookRegistry::builder()
            .on_env_change(EnvChangeType::CharSet, move |_, _, _| {
                *fired.lock().unwrap() += 1;
            })
            .build()
    };

    let server = server(vec![MockReply::Packages(vec![
        database_change("master", "pubs2"),
        done(DoneStatus::FINAL, 0),
    ])])
    .await;
    let mut conn = connect_with(&server, Config::default(), hooks).await;

    conn.exec(&CancellationToken::new(), "use pubs2", &[])
        .await
        .unwrap();
    assert_eq!(*fired.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_eed_hooks_see_messages_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hooks = {
        let seen = Arc::clone(&seen);
        HookRegistry::builder()
            .on_eed(move |eed| seen.lock().unwrap().push(eed.number))
            .build()
    };

    let server = server(vec![MockReply::Packages(vec![
        Package::Eed(Eed::new(5701, 10, "changed database context")),
        Package::Eed(Eed::new(5703, 10, "changed language setting")),
        Package::Eed(Eed::new(208, 16, "t not found")),
        done(DoneStatus::FINAL | DoneStatus::ERROR, 0),
    ])])
    .await;
    let mut conn = connect_with(&server, Config::default(), hooks).await;

    let err = conn
        .exec(&CancellationToken::new(), "select * from t", &[])
        .await
        .unwrap_err();
    assert!(err.is_server_error(208));
    assert_eq!(*seen.lock().unwrap(), vec![5701, 5703, 208]);
}

#[tokio::test]
async fn test_packet_size_change_resizes_channel() {
    let server = server(vec![MockReply::Packages(vec![
        Package::EnvChange(EnvChangePackage::new(vec![EnvChange::new(
            EnvChangeType::PacketSize,
            "512",
            "2048",
        )])),
        done(DoneStatus::FINAL, 0),
    ])])
    .await;
    let mut conn = connect_with(&server, Config::default(), HookRegistry::empty()).await;
    assert_eq!(conn.channel().packet_size(), 512);

    conn.exec(&CancellationToken::new(), "select 1", &[])
        .await
        .unwrap();
    assert_eq!(conn.channel().packet_size(), 2048);
}
