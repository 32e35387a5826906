//! Methods served to admitted connections
//!
//! The public handler exposes identity and blob replication. The master
//! handler, granted only to our own identity, adds local publishing and
//! introspection.

use crate::blobs::BlobManager;
use crate::contacts::ContactLog;
use crate::graph::GraphBuilder;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::Arc;
use tangle_core::{BlobRef, ContactMessage, FeedRef};
use tangle_net::{HandlerRegistry, LineSink, Plugin, PluginError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Node services the plugins operate on
#[derive(Clone)]
pub struct Services {
    pub feed: FeedRef,
    pub blobs: Arc<BlobManager>,
    pub contacts: Arc<ContactLog>,
    pub graph: Arc<GraphBuilder>,
}

/// Handler for authorized peers
pub fn public_handler(services: &Services) -> Arc<HandlerRegistry> {
    let registry = Arc::new(HandlerRegistry::new("public"));
    register_public(&registry, services);
    registry
}

/// Handler for our own identity
pub fn master_handler(services: &Services) -> Arc<HandlerRegistry> {
    let registry = Arc::new(HandlerRegistry::new("master"));
    register_public(&registry, services);
    registry.register(Arc::new(BlobsAdd(services.blobs.clone())));
    registry.register(Arc::new(ContactsPublish {
        feed: services.feed,
        contacts: services.contacts.clone(),
    }));
    registry.register(Arc::new(AboutPublish {
        feed: services.feed,
        contacts: services.contacts.clone(),
    }));
    registry.register(Arc::new(GraphDot(services.graph.clone())));
    registry.register(Arc::new(Status(services.clone())));
    registry
}

fn register_public(registry: &HandlerRegistry, services: &Services) {
    registry.register(Arc::new(Whoami(services.feed)));
    registry.register(Arc::new(BlobsHas(services.blobs.clone())));
    registry.register(Arc::new(BlobsGet(services.blobs.clone())));
    registry.register(Arc::new(BlobsPush(services.blobs.clone())));
}

fn failed(e: impl std::fmt::Display) -> PluginError {
    PluginError::Failed(e.to_string())
}

fn parse_blob(args: &str) -> Result<BlobRef, PluginError> {
    args.parse()
        .map_err(|e| PluginError::BadArgs(format!("{args:?} is not a blob ref: {e}")))
}

struct Whoami(FeedRef);

#[async_trait]
impl Plugin for Whoami {
    fn method(&self) -> &'static str {
        "whoami"
    }

    async fn call(
        &self,
        _args: &str,
        sink: &mut LineSink,
        _scope: &CancellationToken,
    ) -> Result<(), PluginError> {
        sink.send(&self.0.to_string()).await?;
        Ok(())
    }
}

struct BlobsHas(Arc<BlobManager>);

#[async_trait]
impl Plugin for BlobsHas {
    fn method(&self) -> &'static str {
        "blobs.has"
    }

    async fn call(
        &self,
        args: &str,
        sink: &mut LineSink,
        _scope: &CancellationToken,
    ) -> Result<(), PluginError> {
        let blob = parse_blob(args)?;
        let has = self.0.store().has(&blob).map_err(failed)?;
        sink.send(if has { "true" } else { "false" }).await?;
        Ok(())
    }
}

/// Replies with the base64 content
struct BlobsGet(Arc<BlobManager>);

#[async_trait]
impl Plugin for BlobsGet {
    fn method(&self) -> &'static str {
        "blobs.get"
    }

    async fn call(
        &self,
        args: &str,
        sink: &mut LineSink,
        _scope: &CancellationToken,
    ) -> Result<(), PluginError> {
        let blob = parse_blob(args)?;
        let data = self
            .0
            .store()
            .get(&blob)
            .map_err(failed)?
            .ok_or_else(|| PluginError::Failed(format!("no such blob {blob}")))?;
        sink.send(&BASE64.encode(data)).await?;
        Ok(())
    }
}

/// Streams newly available blob refs until the call scope concludes
struct BlobsPush(Arc<BlobManager>);

#[async_trait]
impl Plugin for BlobsPush {
    fn method(&self) -> &'static str {
        "blobs.push"
    }

    async fn call(
        &self,
        _args: &str,
        sink: &mut LineSink,
        scope: &CancellationToken,
    ) -> Result<(), PluginError> {
        let mut pushes = self.0.subscribe(scope.clone()).await;
        while let Some(blob) = pushes.recv().await {
            sink.send(&blob.to_string()).await?;
        }
        debug!("Blob push stream ended");
        Ok(())
    }
}

/// Stores base64 content and announces it
struct BlobsAdd(Arc<BlobManager>);

#[async_trait]
impl Plugin for BlobsAdd {
    fn method(&self) -> &'static str {
        "blobs.add"
    }

    async fn call(
        &self,
        args: &str,
        sink: &mut LineSink,
        _scope: &CancellationToken,
    ) -> Result<(), PluginError> {
        let data = BASE64
            .decode(args)
            .map_err(|e| PluginError::BadArgs(format!("content is not base64: {e}")))?;
        let blob = self.0.add(&data).await.map_err(failed)?;
        sink.send(&blob.to_string()).await?;
        Ok(())
    }
}

/// `follow|unfollow|block|unblock <feed>`
struct ContactsPublish {
    feed: FeedRef,
    contacts: Arc<ContactLog>,
}

#[async_trait]
impl Plugin for ContactsPublish {
    fn method(&self) -> &'static str {
        "contacts.publish"
    }

    async fn call(
        &self,
        args: &str,
        sink: &mut LineSink,
        _scope: &CancellationToken,
    ) -> Result<(), PluginError> {
        let (verb, target) = args
            .split_once(' ')
            .ok_or_else(|| PluginError::BadArgs("usage: <verb> <feed>".into()))?;
        let target: FeedRef = target
            .trim()
            .parse()
            .map_err(|e| PluginError::BadArgs(format!("bad feed: {e}")))?;

        let msg = match verb {
            "follow" => ContactMessage::follow(self.feed, target),
            "block" => ContactMessage::block(self.feed, target),
            "unfollow" | "unblock" => ContactMessage::neutral(self.feed, target),
            other => return Err(PluginError::BadArgs(format!("unknown verb {other}"))),
        };
        let seq = self.contacts.append(&msg).map_err(failed)?;
        info!("Published {} {:?} at {}", verb, target, seq);
        sink.send(&seq.to_string()).await?;
        Ok(())
    }
}

struct AboutPublish {
    feed: FeedRef,
    contacts: Arc<ContactLog>,
}

#[async_trait]
impl Plugin for AboutPublish {
    fn method(&self) -> &'static str {
        "about.publish"
    }

    async fn call(
        &self,
        args: &str,
        sink: &mut LineSink,
        _scope: &CancellationToken,
    ) -> Result<(), PluginError> {
        if args.is_empty() {
            return Err(PluginError::BadArgs("empty name".into()));
        }
        let seq = self
            .contacts
            .append(&ContactMessage::About {
                about: self.feed,
                name: args.to_string(),
            })
            .map_err(failed)?;
        sink.send(&seq.to_string()).await?;
        Ok(())
    }
}

struct GraphDot(Arc<GraphBuilder>);

#[async_trait]
impl Plugin for GraphDot {
    fn method(&self) -> &'static str {
        "graph.dot"
    }

    async fn call(
        &self,
        _args: &str,
        sink: &mut LineSink,
        _scope: &CancellationToken,
    ) -> Result<(), PluginError> {
        let dot = self.0.to_dot();
        for line in dot.lines() {
            sink.send(line).await?;
        }
        Ok(())
    }
}

/// One `key value` line per statistic
struct Status(Services);

#[async_trait]
impl Plugin for Status {
    fn method(&self) -> &'static str {
        "status"
    }

    async fn call(
        &self,
        _args: &str,
        sink: &mut LineSink,
        _scope: &CancellationToken,
    ) -> Result<(), PluginError> {
        let s = &self.0;
        sink.send(&format!("feed {}", s.feed)).await?;
        sink.send(&format!("graph_nodes {}", s.graph.node_count()))
            .await?;
        sink.send(&format!("contacts {}", s.contacts.len())).await?;
        sink.send(&format!("blobs {}", s.blobs.store().len())).await?;
        sink.send(&format!(
            "push_subscribers {}",
            s.blobs.pushes().subscriber_count().await
        ))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::SledBlobStore;
    use crate::storage::Storage;
    use tempfile::tempdir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

    struct Client {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        write: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn call(&mut self, line: &str) -> String {
            self.write.write_all(format!("{line}\n").as_bytes()).await.unwrap();
            self.next().await
        }

        async fn next(&mut self) -> String {
            self.lines.next_line().await.unwrap().unwrap()
        }
    }

    fn services() -> (tempfile::TempDir, Services) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let services = Services {
            feed: FeedRef::ed25519([1; 32]),
            blobs: Arc::new(BlobManager::new(Arc::new(SledBlobStore::new(storage.clone())))),
            contacts: Arc::new(ContactLog::open(storage).unwrap()),
            graph: Arc::new(GraphBuilder::new()),
        };
        (dir, services)
    }

    fn connect(handler: Arc<HandlerRegistry>, scope: CancellationToken) -> Client {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(async move { handler.serve(server, scope).await });
        let (read, write) = tokio::io::split(client);
        Client {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    #[test]
    fn test_handler_methods() {
        let (_dir, services) = services();
        assert_eq!(
            public_handler(&services).methods(),
            vec!["blobs.get", "blobs.has", "blobs.push", "whoami"]
        );
        let master = master_handler(&services).methods();
        assert!(master.contains(&"whoami"));
        assert!(master.contains(&"contacts.publish"));
        assert_eq!(master.len(), 9);
    }

    #[tokio::test]
    async fn test_public_methods() {
        let (_dir, services) = services();
        let blob = services.blobs.add(b"hi").await.unwrap();
        let mut client = connect(public_handler(&services), CancellationToken::new());

        assert_eq!(client.call("whoami").await, services.feed.to_string());
        assert_eq!(client.call(&format!("blobs.has {blob}")).await, "true");
        assert_eq!(
            client.call(&format!("blobs.get {blob}")).await,
            BASE64.encode(b"hi")
        );
        assert!(client.call("blobs.get nope").await.starts_with("error: bad arguments"));
        assert_eq!(
            client.call("blobs.add aGk=").await,
            "error: unknown method blobs.add"
        );
    }

    #[tokio::test]
    async fn test_master_publishing() {
        let (_dir, services) = services();
        let mut client = connect(master_handler(&services), CancellationToken::new());
        let peer = FeedRef::ed25519([2; 32]);

        assert_eq!(client.call(&format!("contacts.publish follow {peer}")).await, "0");
        assert_eq!(client.call("about.publish alice").await, "1");
        assert!(client
            .call(&format!("contacts.publish like {peer}"))
            .await
            .starts_with("error: bad arguments"));

        services.graph.catch_up(&services.contacts).unwrap();
        assert_eq!(services.graph.follows(&services.feed), vec![peer]);
        assert_eq!(
            services.graph.graph().name(&services.feed).as_deref(),
            Some("alice")
        );

        assert_eq!(client.call("graph.dot").await, "digraph {");
        // skip the rest of the dot output
        while client.next().await != "}" {}

        assert_eq!(
            client.call("blobs.add aGk=").await,
            BlobRef::of(b"hi").to_string()
        );
        assert_eq!(client.call("status").await, format!("feed {}", services.feed));
        assert_eq!(client.next().await, "graph_nodes 2");
        assert_eq!(client.next().await, "contacts 2");
        assert_eq!(client.next().await, "blobs 1");
        assert_eq!(client.next().await, "push_subscribers 0");
    }

    #[tokio::test]
    async fn test_push_stream_follows_connection_scope() {
        let (_dir, services) = services();
        let scope = CancellationToken::new();
        let mut client = connect(public_handler(&services), scope.clone());

        client.write.write_all(b"blobs.push\n").await.unwrap();
        let pushes = services.blobs.pushes().clone();
        while pushes.subscriber_count().await == 0 {
            tokio::task::yield_now().await;
        }

        let blob = services.blobs.add(b"pushed").await.unwrap();
        assert_eq!(client.next().await, blob.to_string());

        scope.cancel();
        while pushes.subscriber_count().await != 0 {
            tokio::task::yield_now().await;
        }
    }
}
