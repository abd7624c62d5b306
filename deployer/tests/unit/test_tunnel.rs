//! Tunnel provisioning tests

use modeldeploy::deploy::tunnel::{provision_tunnel, Options, TunnelOutcome, TunnelRequest};

use crate::support::{fail, ok, ScriptedSession};

fn tunnel_request() -> TunnelRequest<'static> {
    TunnelRequest {
        deployment_id: "1a2b3c4d-5e6f-7a8b-9c0d",
        port: 4100,
        subdomain: "my-api-1a2b3c4d",
        password: Some("hunter2"),
    }
}

fn launches_without_subdomain(session: &ScriptedSession) -> usize {
    session
        .commands()
        .iter()
        .filter(|c| c.contains("nohup lt --port") && !c.contains("--subdomain"))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_tunnel_with_requested_subdomain() {
    let session = ScriptedSession::new()
        .on("which lt", ok("/usr/local/bin/lt\n"))
        .on("ps -p", ok("  PID TTY\n 4242 ?\n"))
        .on("cat ~/tunnel-1a2b3c4d", ok("your url is: https://my-api-1a2b3c4d.loca.lt\n"))
        .on("curl -s -o /dev/null", ok("200"));

    let outcome = provision_tunnel(&session, &tunnel_request(), &Options::default()).await;

    assert_eq!(
        outcome,
        TunnelOutcome::Tunnel("https://my-api-1a2b3c4d.loca.lt".to_string())
    );
    assert_eq!(session.count("nohup lt --port 4100 --subdomain 'my-api-1a2b3c4d'"), 1);
    assert_eq!(session.count("curl -s --max-time"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_tunnel_tries_assigned_subdomain_once() {
    let session = ScriptedSession::new()
        .on("which lt", ok("/usr/local/bin/lt\n"))
        .on("ps -p", fail(""))
        .on("curl -s --max-time", fail(""));

    let outcome = provision_tunnel(&session, &tunnel_request(), &Options::default()).await;

    assert_eq!(outcome, TunnelOutcome::Unavailable);
    assert_eq!(session.count("--subdomain 'my-api-1a2b3c4d'"), 3);
    assert_eq!(launches_without_subdomain(&session), 1);
    assert_eq!(session.count("curl -s --max-time 10"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_tunnel_url_counts_as_failure() {
    let session = ScriptedSession::new()
        .on("which lt", ok("/usr/local/bin/lt\n"))
        .on("ps -p", ok(""))
        .on("cat ~/tunnel-1a2b3c4d", ok("your url is: https://taken.loca.lt\n"))
        .on("curl -s -o /dev/null", ok("503"))
        .on("api.ipify.org", ok("203.0.113.7\n"));

    let outcome = provision_tunnel(&session, &tunnel_request(), &Options::default()).await;

    assert_eq!(
        outcome,
        TunnelOutcome::DirectIp("http://203.0.113.7:4100".to_string())
    );
    assert_eq!(outcome.tunnel_url(), None);
    assert_eq!(launches_without_subdomain(&session), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_client_falls_back_to_direct_ip() {
    let session = ScriptedSession::new()
        .on("which lt", fail(""))
        .on("which npm", ok("/usr/bin/npm\n"))
        .on("npm install -g localtunnel", fail("EACCES"))
        .on("api.ipify.org", ok("<html>rate limited</html>"))
        .on("ifconfig.me", ok("2001:db8::7\n"));

    let outcome = provision_tunnel(&session, &tunnel_request(), &Options::default()).await;

    assert_eq!(
        outcome,
        TunnelOutcome::DirectIp("http://[2001:db8::7]:4100".to_string())
    );
    assert_eq!(session.count("nohup lt"), 0);
    assert_eq!(session.count("icanhazip.com"), 0);
}
