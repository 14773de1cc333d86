//! Integration tests for group access control and moderation.

mod common;

use common::{TestClient, TestServer};
use icb_proto::packet::tag;

#[tokio::test]
async fn test_restricted_group_blocks_uninvited_entry() {
    let server = TestServer::spawn(17336).await.expect("spawn server");

    // Alice creates the group, which makes her its moderator.
    let mut alice = TestClient::connect(&server.address()).await.expect("connect");
    alice.login("alice", "clubhouse").await.expect("login alice");
    alice
        .recv_status("Status", "You are now in group clubhouse as moderator")
        .await
        .expect("creator moderatorship");
    alice.command("status", "r").await.expect("restrict");
    alice
        .recv_status("Change", "restricted")
        .await
        .expect("restriction announced");

    let mut bob = TestClient::connect(&server.address()).await.expect("connect");
    bob.login("bob", "").await.expect("login bob");
    bob.recv_status("Status", "You are now in group lobby")
        .await
        .expect("bob in lobby");

    bob.command("g", "clubhouse").await.expect("send join");
    bob.recv_error("restricted").await.expect("entry refused");

    // Bob is still in his previous group.
    bob.command("topic", "").await.expect("query topic");
    bob.recv_status("Topic", "Test lobby")
        .await
        .expect("still in lobby");
}

#[tokio::test]
async fn test_invited_session_may_enter_restricted_group() {
    let server = TestServer::spawn(17337).await.expect("spawn server");

    let mut alice = TestClient::connect(&server.address()).await.expect("connect");
    alice.login("alice", "clubhouse").await.expect("login alice");
    alice
        .recv_status("Status", "as moderator")
        .await
        .expect("moderatorship");
    alice.command("status", "r").await.expect("restrict");

    let mut bob = TestClient::connect(&server.address()).await.expect("connect");
    bob.login("bob", "").await.expect("login bob");
    bob.recv_status("Status", "You are now in group lobby")
        .await
        .expect("bob in lobby");

    alice.command("invite", "bob").await.expect("invite");
    bob.recv_status("RSVP", "invited to group clubhouse by alice")
        .await
        .expect("rsvp notice");

    bob.command("g", "clubhouse").await.expect("join");
    bob.recv_status("Status", "You are now in group clubhouse")
        .await
        .expect("entry granted");
}

#[tokio::test]
async fn test_moderator_signoff_hands_off_to_most_recent() {
    let server = TestServer::spawn(17338).await.expect("spawn server");

    let mut alice = TestClient::connect(&server.address()).await.expect("connect");
    alice.login("alice", "meeting").await.expect("login alice");
    alice
        .recv_status("Status", "as moderator")
        .await
        .expect("moderatorship");

    let mut bob = TestClient::connect(&server.address()).await.expect("connect");
    bob.login("bob", "meeting").await.expect("login bob");
    bob.recv_status("Status", "You are now in group meeting")
        .await
        .expect("bob joined");

    let mut carol = TestClient::connect(&server.address()).await.expect("connect");
    carol.login("carol", "meeting").await.expect("login carol");
    carol
        .recv_status("Status", "You are now in group meeting")
        .await
        .expect("carol joined");

    // Bob becomes the most recently active member.
    bob.open("still here").await.expect("bob speaks");
    carol
        .recv_until(|f| f.tag == tag::OPEN)
        .await
        .expect("carol hears bob");

    drop(alice);

    carol
        .recv_status("Pass", "bob is now the moderator")
        .await
        .expect("hand-off to bob");
}

#[tokio::test]
async fn test_boot_ejects_member_to_boot_group() {
    let server = TestServer::spawn(17339).await.expect("spawn server");

    let mut alice = TestClient::connect(&server.address()).await.expect("connect");
    alice.login("alice", "court").await.expect("login alice");
    alice
        .recv_status("Status", "as moderator")
        .await
        .expect("moderatorship");

    let mut bob = TestClient::connect(&server.address()).await.expect("connect");
    bob.login("bob", "court").await.expect("login bob");
    bob.recv_status("Status", "You are now in group court")
        .await
        .expect("bob joined");

    alice.command("boot", "bob").await.expect("boot");
    bob.recv_status("Boot", "You were booted from court.")
        .await
        .expect("boot notice");
    bob.recv_status("Status", "You are now in group boot")
        .await
        .expect("landed in boot group");
}

#[tokio::test]
async fn test_rename_is_announced_to_group() {
    let server = TestServer::spawn(17340).await.expect("spawn server");

    let mut alice = TestClient::connect(&server.address()).await.expect("connect");
    alice.login("alice", "").await.expect("login alice");
    let mut bob = TestClient::connect(&server.address()).await.expect("connect");
    bob.login("bob", "").await.expect("login bob");
    bob.recv_status("Status", "You are now in group")
        .await
        .expect("bob joined");

    alice.command("name", "alicia").await.expect("rename");
    bob.recv_status("Name", "alice changed nickname to alicia")
        .await
        .expect("rename announcement");
}

#[tokio::test]
async fn test_unauthenticated_login_cannot_claim_live_nick() {
    let server = TestServer::spawn(17341).await.expect("spawn server");

    let mut alice = TestClient::connect(&server.address()).await.expect("connect");
    alice.login("alice", "").await.expect("login alice");

    let mut imposter = TestClient::connect(&server.address()).await.expect("connect");
    imposter
        .send(icb_proto::Packet::new(
            tag::LOGIN,
            ["intruder", "alice", "", "login", ""],
        ))
        .await
        .expect("send login");

    imposter
        .recv_status("Warning", "Nickname already in use.")
        .await
        .expect("claim refused");
}

#[tokio::test]
async fn test_quiet_group_suppresses_open_messages() {
    let server = TestServer::spawn(17342).await.expect("spawn server");

    let mut alice = TestClient::connect(&server.address()).await.expect("connect");
    alice.login("alice", "library").await.expect("login alice");
    alice
        .recv_status("Status", "as moderator")
        .await
        .expect("moderatorship");

    let mut bob = TestClient::connect(&server.address()).await.expect("connect");
    bob.login("bob", "library").await.expect("login bob");
    bob.recv_status("Status", "You are now in group library")
        .await
        .expect("bob joined");

    alice.command("status", "q").await.expect("quiet the group");
    alice
        .recv_status("Change", "quiet")
        .await
        .expect("quiet announced");

    alice.open("shh").await.expect("send open");
    alice
        .recv_error("quiet group")
        .await
        .expect("quiet rejection");
}
