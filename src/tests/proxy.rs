use std::io::{BufReader, Read};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::proxy::{handlers, login, Phase};
use crate::serial::{Chat, GenericArray, Long, Readable, VarInt, Writable};
use crate::stats::{BedwarsStats, PlayerStats};
use crate::stream::{Frame, FrameReader, FrameWriter};
use crate::world::{PlayerEntry, StatsEntry};

use super::util;

fn reader(sock: &TcpStream) -> FrameReader<BufReader<TcpStream>> {
    FrameReader::new(BufReader::new(sock.try_clone().unwrap()))
}

fn team_create_payload(name: &str, prefix: &str, visibility: &str, players: &[&str]) -> Vec<u8> {
    let mut payload = Vec::new();
    name.to_owned().write_to(&mut payload).unwrap();
    0u8.write_to(&mut payload).unwrap(); // mode: create
    name.to_owned().write_to(&mut payload).unwrap();
    prefix.to_owned().write_to(&mut payload).unwrap();
    String::new().write_to(&mut payload).unwrap();
    0u8.write_to(&mut payload).unwrap();
    visibility.to_owned().write_to(&mut payload).unwrap();
    0u8.write_to(&mut payload).unwrap();
    GenericArray::<VarInt, String>::from(players.iter().map(|p| p.to_string()).collect::<Vec<_>>())
        .write_to(&mut payload)
        .unwrap();
    payload
}

fn clientbound_chat_payload(message: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    Chat::from(message).write_to(&mut payload).unwrap();
    0u8.write_to(&mut payload).unwrap();
    payload
}

fn entry(uuid: Uuid, name: &str) -> PlayerEntry {
    PlayerEntry {
        uuid,
        name: name.to_owned(),
        gamemode: 0,
        ping: 0,
        display: None,
        properties: vec![],
    }
}

#[test]
fn server_list_ping_scenario() {
    let (session, peer) = util::test_session();
    let pump = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.run())
    };

    let mut tx = FrameWriter::new(peer.try_clone().unwrap());
    let mut rx = reader(&peer);

    let mut handshake = Vec::new();
    VarInt(47).write_to(&mut handshake).unwrap();
    "x".to_owned().write_to(&mut handshake).unwrap();
    0u16.write_to(&mut handshake).unwrap();
    VarInt(1).write_to(&mut handshake).unwrap();
    tx.write_frame(0x00, &handshake).unwrap();

    tx.write_frame(0x00, &[]).unwrap();
    let status = rx.read_frame().unwrap().unwrap();
    assert_eq!(status.id, 0x00);
    let mut buf = &status.payload[..];
    let body: Value = serde_json::from_str(&String::read_from(&mut buf).unwrap()).unwrap();
    assert_eq!(body["version"]["name"], "1.8.9");
    assert_eq!(body["version"]["protocol"], 47);
    assert_eq!(body["players"]["max"], 1);
    assert!(body["favicon"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let mut ping = Vec::new();
    (42 as Long).write_to(&mut ping).unwrap();
    tx.write_frame(0x01, &ping).unwrap();
    let pong = rx.read_frame().unwrap().unwrap();
    assert_eq!(pong.id, 0x01);
    let mut buf = &pong.payload[..];
    assert_eq!(Long::read_from(&mut buf).unwrap(), 42);

    // the proxy hangs up after the pong
    assert!(matches!(rx.read_frame(), Ok(None) | Err(_)));
    pump.join().unwrap();
}

#[test]
fn degenerate_handshakes_are_dropped() {
    let (session, _peer) = util::test_session();
    handlers::handshake(&session, Frame {
        id: 0x00,
        payload: vec![1, 2],
    })
    .unwrap();
    assert_eq!(session.phase(), Phase::Handshaking);
}

#[test]
fn login_start_records_the_username() {
    let (session, _peer) = util::test_session();
    let server = util::attach_fake_server(&session);

    let payload = util::chat_payload("tester");
    handlers::login_start(&session, Frame {
        id: 0x00,
        payload: payload.clone(),
    })
    .unwrap();

    assert_eq!(session.world.lock().unwrap().username, "tester");
    let mut rx = reader(&server);
    assert_eq!(rx.read_frame().unwrap().unwrap(), Frame { id: 0x00, payload });
}

#[test]
fn login_applies_compression_and_enters_play() {
    let (session, peer) = util::test_session();
    session.set_phase(Phase::Login);

    // a scripted upstream: set-compression 256, then login success,
    // the latter already in the compressed frame shape
    let mut tx = FrameWriter::new(Vec::new());
    let mut threshold = Vec::new();
    VarInt(256).write_to(&mut threshold).unwrap();
    tx.write_frame(0x03, &threshold).unwrap();
    tx.set_compression(256);
    let mut success = Vec::new();
    "069a79f4-44e9-4726-a5be-fca90e38aaf5"
        .to_owned()
        .write_to(&mut success)
        .unwrap();
    "tester".to_owned().write_to(&mut success).unwrap();
    tx.write_frame(0x02, &success).unwrap();
    let script = tx.into_inner();

    let mut rx = FrameReader::new(&script[..]);
    assert!(login::perform(&session, &mut rx).unwrap());
    assert_eq!(session.phase(), Phase::Play);

    // the set-compression notice reaches the client first, still in
    // the plain frame shape
    let mut client_rx = reader(&peer);
    let frame = client_rx.read_frame().unwrap().unwrap();
    assert_eq!(frame.id, 0x03);
    let mut buf = &frame.payload[..];
    assert_eq!(VarInt::read_from(&mut buf).unwrap().0, 256);
    client_rx.set_compression(256);

    // login success follows, already in the compressed shape
    let frame = client_rx.read_frame().unwrap().unwrap();
    assert_eq!(frame.id, 0x02);
    let mut buf = &frame.payload[..];
    assert_eq!(
        String::read_from(&mut buf).unwrap(),
        "069a79f4-44e9-4726-a5be-fca90e38aaf5"
    );

    // and so does everything the proxy writes from here on
    session.send_client_chat("compression is on").unwrap();
    let frame = client_rx.read_frame().unwrap().unwrap();
    assert_eq!(frame.id, 0x02);
    let mut buf = &frame.payload[..];
    assert_eq!(
        Chat::read_from(&mut buf).unwrap(),
        Chat::from("compression is on")
    );
}

#[test]
fn requeue_plays_the_current_mode() {
    let (session, _peer) = util::test_session();
    let server = util::attach_fake_server(&session);
    session.world.lock().unwrap().game.mode = "eight_one".to_owned();

    handlers::client_chat(&session, Frame {
        id: 0x01,
        payload: util::chat_payload("/rq"),
    })
    .unwrap();

    let mut rx = reader(&server);
    let frame = rx.read_frame().unwrap().unwrap();
    assert_eq!(frame.id, 0x01);
    let mut buf = &frame.payload[..];
    assert_eq!(String::read_from(&mut buf).unwrap(), "/play eight_one");
}

#[test]
fn requeue_without_a_game_reports_the_error() {
    let (session, peer) = util::test_session();

    handlers::client_chat(&session, Frame {
        id: 0x01,
        payload: util::chat_payload("/rq"),
    })
    .unwrap();

    let mut rx = reader(&peer);
    let frame = rx.read_frame().unwrap().unwrap();
    assert_eq!(frame.id, 0x02);
    let mut buf = &frame.payload[..];
    assert_eq!(
        Chat::read_from(&mut buf).unwrap(),
        Chat::from("§9§l∎ §4No game to requeue!")
    );
}

#[test]
fn unknown_commands_forward_verbatim() {
    let (session, _peer) = util::test_session();
    let server = util::attach_fake_server(&session);

    let payload = util::chat_payload("/unknown foo");
    handlers::client_chat(&session, Frame {
        id: 0x01,
        payload: payload.clone(),
    })
    .unwrap();

    let mut rx = reader(&server);
    assert_eq!(rx.read_frame().unwrap().unwrap(), Frame { id: 0x01, payload });
}

#[test]
fn double_slash_output_is_spoken_upstream() {
    let (session, _peer) = util::test_session();
    let server = util::attach_fake_server(&session);

    handlers::client_chat(&session, Frame {
        id: 0x01,
        payload: util::chat_payload("//garlicbread"),
    })
    .unwrap();

    let mut rx = reader(&server);
    let frame = rx.read_frame().unwrap().unwrap();
    assert_eq!(frame.id, 0x01);
    let mut buf = &frame.payload[..];
    assert_eq!(String::read_from(&mut buf).unwrap(), "Mmm, garlic bread.");
}

#[test]
fn join_game_resets_the_world_and_probes_locraw() {
    let (session, peer) = util::test_session();
    let server = util::attach_fake_server(&session);
    let uuid = Uuid::from_u128(5);
    {
        let mut world = session.world.lock().unwrap();
        world.players.insert(uuid, entry(uuid, "Old"));
        world.players_with_stats.insert(
            "old".to_owned(),
            StatsEntry {
                uuid,
                display: String::new(),
            },
        );
    }

    handlers::join_game(&session, Frame {
        id: 0x01,
        payload: vec![1, 2, 3],
    })
    .unwrap();

    {
        let world = session.world.lock().unwrap();
        assert!(world.players.is_empty());
        assert!(world.players_with_stats.is_empty());
        assert!(world.waiting_for_locraw);
    }

    let mut client_rx = reader(&peer);
    assert_eq!(
        client_rx.read_frame().unwrap().unwrap(),
        Frame {
            id: 0x01,
            payload: vec![1, 2, 3]
        }
    );

    let mut server_rx = reader(&server);
    let probe = server_rx.read_frame().unwrap().unwrap();
    assert_eq!(probe.id, 0x01);
    let mut buf = &probe.payload[..];
    assert_eq!(String::read_from(&mut buf).unwrap(), "/locraw");
}

#[test]
fn locraw_answers_are_consumed_into_the_game() {
    let (session, peer) = util::test_session();
    session.world.lock().unwrap().waiting_for_locraw = true;

    let payload = clientbound_chat_payload(
        r#"{"server":"mini1A","gametype":"BEDWARS","mode":"EIGHT_ONE","map":"Dreams"}"#,
    );
    handlers::server_chat(&session, Frame { id: 0x02, payload }).unwrap();

    {
        let world = session.world.lock().unwrap();
        assert_eq!(world.game.mode, "eight_one");
        assert_eq!(world.game.map, "dreams");
        assert_eq!(world.rq_game.mode, "eight_one");
        assert!(!world.waiting_for_locraw);
    }

    // nothing was forwarded to the client
    peer.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
    let mut byte = [0u8; 1];
    assert!((&peer).read(&mut byte).is_err());
}

#[test]
fn limbo_retries_the_probe() {
    let (session, _peer) = util::test_session();
    let server = util::attach_fake_server(&session);
    session.world.lock().unwrap().waiting_for_locraw = true;

    let payload = clientbound_chat_payload(r#"{"server":"limbo"}"#);
    handlers::server_chat(&session, Frame { id: 0x02, payload }).unwrap();

    let mut rx = reader(&server);
    let probe = rx.read_frame().unwrap().unwrap();
    assert_eq!(probe.id, 0x01);
    let mut buf = &probe.payload[..];
    assert_eq!(String::read_from(&mut buf).unwrap(), "/locraw");
    assert_eq!(session.world.lock().unwrap().locraw_retries, 1);
}

#[test]
fn ordinary_chat_passes_through_while_waiting() {
    let (session, peer) = util::test_session();
    session.world.lock().unwrap().waiting_for_locraw = true;

    let payload = clientbound_chat_payload("Welcome to the lobby!");
    handlers::server_chat(&session, Frame {
        id: 0x02,
        payload: payload.clone(),
    })
    .unwrap();

    let mut rx = reader(&peer);
    assert_eq!(rx.read_frame().unwrap().unwrap(), Frame { id: 0x02, payload });
}

#[test]
fn the_client_brand_is_sniffed_from_the_plugin_channel() {
    let (session, _peer) = util::test_session();
    let server = util::attach_fake_server(&session);

    let mut payload = Vec::new();
    "MC|Brand".to_owned().write_to(&mut payload).unwrap();
    "lunarclient:v2".to_owned().write_to(&mut payload).unwrap();
    handlers::plugin_message(&session, Frame {
        id: 0x17,
        payload: payload.clone(),
    })
    .unwrap();

    assert_eq!(session.world.lock().unwrap().client_brand, "lunar");
    let mut rx = reader(&server);
    assert_eq!(rx.read_frame().unwrap().unwrap(), Frame { id: 0x17, payload });
}

#[test]
fn player_list_items_update_the_model() {
    let (session, peer) = util::test_session();
    let uuid = Uuid::from_u128(9);

    // action 0: one player, no properties, no display name
    let mut payload = Vec::new();
    VarInt(0).write_to(&mut payload).unwrap();
    VarInt(1).write_to(&mut payload).unwrap();
    uuid.write_to(&mut payload).unwrap();
    "Steve".to_owned().write_to(&mut payload).unwrap();
    VarInt(0).write_to(&mut payload).unwrap();
    VarInt(1).write_to(&mut payload).unwrap();
    VarInt(42).write_to(&mut payload).unwrap();
    false.write_to(&mut payload).unwrap();
    handlers::player_list_item(&session, Frame {
        id: 0x38,
        payload: payload.clone(),
    })
    .unwrap();

    {
        let world = session.world.lock().unwrap();
        assert_eq!(world.players[&uuid].name, "Steve");
        assert_eq!(world.players[&uuid].ping, 42);
        assert_eq!(world.players_old[&uuid].name, "Steve");
    }
    let mut rx = reader(&peer);
    assert_eq!(rx.read_frame().unwrap().unwrap(), Frame { id: 0x38, payload });

    // action 2: ping update
    let mut payload = Vec::new();
    VarInt(2).write_to(&mut payload).unwrap();
    VarInt(1).write_to(&mut payload).unwrap();
    uuid.write_to(&mut payload).unwrap();
    VarInt(7).write_to(&mut payload).unwrap();
    handlers::player_list_item(&session, Frame { id: 0x38, payload }).unwrap();
    assert_eq!(session.world.lock().unwrap().players[&uuid].ping, 7);

    // action 4: removal; the snapshot keeps the entry
    let mut payload = Vec::new();
    VarInt(4).write_to(&mut payload).unwrap();
    VarInt(1).write_to(&mut payload).unwrap();
    uuid.write_to(&mut payload).unwrap();
    handlers::player_list_item(&session, Frame { id: 0x38, payload }).unwrap();
    let world = session.world.lock().unwrap();
    assert!(world.players.get(&uuid).is_none());
    assert!(world.players_old.get(&uuid).is_some());
}

#[test]
fn enrichment_pushes_display_updates() {
    let uuid = Uuid::from_u128(0xfeed);
    let stub = util::StubStats::with_player(PlayerStats {
        name: "Alice".to_owned(),
        uuid: uuid.to_simple().to_string(),
        rank: String::new(),
        plus_color: None,
        bedwars: BedwarsStats {
            level: 1,
            final_kills: 0,
            fkdr: 0.5,
            wins: 0,
            wlr: 0.0,
        },
        skywars: Default::default(),
    });
    let (session, peer) = util::test_session_with(stub.clone());

    let payload = team_create_payload("team1", "§a", "always", &["Alice"]);
    handlers::teams(&session, Frame {
        id: 0x3E,
        payload: payload.clone(),
    })
    .unwrap();

    let mut rx = reader(&peer);
    assert_eq!(
        rx.read_frame().unwrap().unwrap(),
        Frame {
            id: 0x3E,
            payload: payload.clone()
        }
    );

    let synthetic = rx.read_frame().unwrap().unwrap();
    assert_eq!(synthetic.id, 0x38);
    let mut buf = &synthetic.payload[..];
    assert_eq!(VarInt::read_from(&mut buf).unwrap().0, 3);
    assert_eq!(VarInt::read_from(&mut buf).unwrap().0, 1);
    assert_eq!(Uuid::read_from(&mut buf).unwrap(), uuid);
    assert!(bool::read_from(&mut buf).unwrap());
    let display = Chat::read_from(&mut buf).unwrap().plain();
    assert!(display.contains("Alice"), "display was {}", display);
    assert!(display.contains("0.5"), "display was {}", display);

    {
        let world = session.world.lock().unwrap();
        assert!(world.players_with_stats.contains_key("alice"));
        assert!(world.players_getting_stats.is_empty());
    }
    assert_eq!(stub.calls.lock().unwrap().len(), 1);

    // a later teams packet re-emits the cached line without refetching
    handlers::teams(&session, Frame {
        id: 0x3E,
        payload: payload.clone(),
    })
    .unwrap();
    assert_eq!(rx.read_frame().unwrap().unwrap().id, 0x3E);
    assert_eq!(rx.read_frame().unwrap().unwrap().id, 0x38);
    assert_eq!(stub.calls.lock().unwrap().len(), 1);
}

#[test]
fn overlapping_scans_fetch_each_name_once() {
    let stub = Arc::new(util::StubStats {
        delay: Some(Duration::from_millis(150)),
        ..Default::default()
    });
    let (session, _peer) = util::test_session_with(stub.clone());

    let payload = team_create_payload("team1", "§a", "always", &["Bob"]);
    handlers::teams(&session, Frame {
        id: 0x3E,
        payload: payload.clone(),
    })
    .unwrap();
    handlers::teams(&session, Frame { id: 0x3E, payload }).unwrap();

    thread::sleep(Duration::from_millis(400));
    assert_eq!(stub.calls.lock().unwrap().len(), 1);
    assert!(session
        .world
        .lock()
        .unwrap()
        .players_getting_stats
        .is_empty());
}

#[test]
fn nicked_players_get_the_nick_marker() {
    // the default stub knows nobody, so every lookup is a nick
    let (session, peer) = util::test_session();
    let uuid = Uuid::from_u128(0xabad1dea);
    session
        .world
        .lock()
        .unwrap()
        .players_old
        .insert(uuid, entry(uuid, "Mystery"));

    let payload = team_create_payload("reds", "§c", "always", &["Mystery"]);
    handlers::teams(&session, Frame { id: 0x3E, payload }).unwrap();

    let mut rx = reader(&peer);
    let _forwarded = rx.read_frame().unwrap().unwrap();
    let synthetic = rx.read_frame().unwrap().unwrap();
    assert_eq!(synthetic.id, 0x38);
    let mut buf = &synthetic.payload[..];
    VarInt::read_from(&mut buf).unwrap();
    VarInt::read_from(&mut buf).unwrap();
    assert_eq!(Uuid::read_from(&mut buf).unwrap(), uuid);
    bool::read_from(&mut buf).unwrap();
    assert_eq!(Chat::read_from(&mut buf).unwrap().plain(), "[NICK] Mystery");
}

#[test]
fn decoy_entries_with_wrong_ranks_are_skipped() {
    let uuid = Uuid::from_u128(77);
    let stub = util::StubStats::with_player(PlayerStats {
        name: "Faker".to_owned(),
        uuid: uuid.to_simple().to_string(),
        rank: "VIP".to_owned(), // green, not the decoy team's red
        ..Default::default()
    });
    let (session, _peer) = util::test_session_with(stub.clone());

    let payload = team_create_payload("hidden", "§c", "never", &["Faker"]);
    handlers::teams(&session, Frame { id: 0x3E, payload }).unwrap();

    thread::sleep(Duration::from_millis(200));
    let world = session.world.lock().unwrap();
    assert!(world.players_with_stats.is_empty());
    assert!(world.players_getting_stats.is_empty());
    assert_eq!(stub.calls.lock().unwrap().len(), 1);
}
