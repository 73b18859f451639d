use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use url::Url;

/// Reports whether the remote service is worth trying right now.
/// Polled synchronously before every sync attempt.
pub trait Connectivity {
    fn is_online(&self) -> bool;
}

impl<F: Fn() -> bool> Connectivity for F {
    fn is_online(&self) -> bool {
        self()
    }
}

/// Reachability switched by the host (OS network callbacks, tests).
#[derive(Debug)]
pub struct ConnectivityFlag {
    online: AtomicBool,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            tracing::info!(online, "connectivity changed");
        }
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
enum ProbeTarget {
    Addrs(Vec<SocketAddr>),
    /// Resolved again on every poll, so a host that failed to resolve while
    /// offline is picked up once the network returns.
    Url(Url),
}

/// Probes reachability by opening a TCP connection to the service host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    target: ProbeTarget,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addrs: Vec<SocketAddr>, timeout: Duration) -> Self {
        Self {
            target: ProbeTarget::Addrs(addrs),
            timeout,
        }
    }

    pub fn for_url(url: &Url, timeout: Duration) -> Self {
        Self {
            target: ProbeTarget::Url(url.clone()),
            timeout,
        }
    }

    fn addrs(&self) -> Vec<SocketAddr> {
        match &self.target {
            ProbeTarget::Addrs(addrs) => addrs.clone(),
            ProbeTarget::Url(url) => url.socket_addrs(|| None).unwrap_or_else(|err| {
                tracing::debug!(%url, error = %err, "cannot resolve service host");
                Vec::new()
            }),
        }
    }
}

impl Connectivity for TcpProbe {
    fn is_online(&self) -> bool {
        self.addrs()
            .iter()
            .any(|addr| TcpStream::connect_timeout(addr, self.timeout).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn flag_reports_what_was_set() {
        let flag = ConnectivityFlag::new(false);
        assert!(!flag.is_online());
        flag.set_online(true);
        assert!(flag.is_online());
    }

    #[test]
    fn closures_are_oracles() {
        let offline = || false;
        assert!(!offline.is_online());
    }

    #[test]
    fn probe_sees_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let probe = TcpProbe::new(vec![addr], Duration::from_millis(200));
        assert!(probe.is_online());
    }

    #[test]
    fn url_probe_sees_service_that_comes_up_later() {
        // reserve a port, then free it so nothing listens there yet
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/api")).unwrap();
        let probe = TcpProbe::for_url(&url, Duration::from_millis(200));
        assert!(!probe.is_online());

        let _listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        assert!(probe.is_online());
    }

    #[test]
    fn unresolvable_host_is_offline_without_panicking() {
        let url = Url::parse("http://learn.invalid:443/").unwrap();
        let probe = TcpProbe::for_url(&url, Duration::from_millis(50));
        assert!(!probe.is_online());
    }

    #[test]
    fn probe_without_addresses_is_offline() {
        let probe = TcpProbe::new(Vec::new(), Duration::from_millis(10));
        assert!(!probe.is_online());
    }
}
