use std::collections::BTreeMap;
use std::sync::Arc;

use bot::prelude::*;

/// Canned replies looked up by command word.
///
/// The table lives in the store as one document per channel and is rewritten
/// on every mutation, so edits survive restarts and roster reloads.
pub struct Reply {
    doc: String,
    table: BTreeMap<String, String>,
    store: Arc<dyn Store>,
}

impl Reply {
    pub fn construct(seed: &HandlerSeed<'_>) -> Result<Box<dyn CommandHandler>, HandlerError> {
        let doc = format!("replies_{}", seed.channel);
        let table = load_as(seed.store.as_ref(), &doc)?.unwrap_or_default();
        Ok(Box::new(Reply {
            doc,
            table,
            store: seed.store.clone(),
        }))
    }

    fn persist(&self) -> Result<(), HandlerError> {
        save_as(self.store.as_ref(), &self.doc, &self.table)?;
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for Reply {
    fn name(&self) -> &'static str {
        "reply"
    }

    fn help(&self) -> String {
        "<name> -- canned reply // reply set <name> <text> -- save one (mods) // reply unset <name> -- drop one (mods)"
            .to_string()
    }

    fn matches(&self, line: &ChatLine<'_>, ctx: &BotContext) -> Result<bool, HandlerError> {
        match line.command(&ctx.prefix) {
            Some(rest) => {
                let word = rest.split_whitespace().next().unwrap_or("");
                Ok(word == "reply" || self.table.contains_key(word))
            }
            None => Ok(false),
        }
    }

    async fn run(&mut self, line: &ChatLine<'_>, ctx: &mut BotContext) -> Result<(), HandlerError> {
        let rest = match line.command(&ctx.prefix) {
            Some(rest) => rest,
            None => return Ok(()),
        };

        let word = rest.split_whitespace().next().unwrap_or("");
        if word != "reply" {
            if let Some(text) = self.table.get(word) {
                ctx.writer.say(text.clone()).await;
            }
            return Ok(());
        }

        if !ctx.is_privileged(line.user) {
            debug!("[{}] {} may not edit replies", ctx.channel, line.user);
            return Ok(());
        }

        let mut parts = rest.splitn(4, ' ');
        let _ = parts.next();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("set"), Some(name), Some(text)) => {
                self.table.insert(name.to_string(), text.to_string());
                self.persist()?;
                ctx.writer.say(format!("'{}' saved", name)).await;
            }
            (Some("unset"), Some(name), None) => {
                if self.table.remove(name).is_some() {
                    self.persist()?;
                    ctx.writer.say(format!("'{}' dropped", name)).await;
                }
            }
            _ => {
                ctx.writer
                    .say("usage: reply set <name> <text> // reply unset <name>")
                    .await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil;

    use std::sync::Arc;

    use async_std::task;

    use bot::bot::HandlerSeed;
    use bot::config::BotConfig;
    use bot::storage::{MemStore, Store};

    fn seed_config(channel: &str) -> BotConfig {
        BotConfig {
            channel: channel.to_string(),
            owners: vec![],
            commands: vec!["reply".to_string()],
            prefix: ">>".to_string(),
            pleb_cooldown_secs: 10,
            raid_announce_threshold: 10,
        }
    }

    fn construct(store: &Arc<dyn Store>, config: &BotConfig) -> Box<dyn CommandHandler> {
        Reply::construct(&HandlerSeed {
            channel: &config.channel,
            config,
            store,
        })
        .expect("Failed to construct reply handler")
    }

    #[test]
    fn test_lookup_answers_with_saved_text() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let config = seed_config("chan");
        let mut handler = construct(&store, &config);
        let (mut ctx, mut rx) = testutil::context_with_store("chan", store);
        ctx.presence.set_mod("somemod", true);

        let fact = ChatFact::default();
        task::block_on(async {
            let set = ChatLine {
                user: "somemod",
                text: ">>reply set greet Hello there!",
                fact: &fact,
            };
            assert_eq!(handler.matches(&set, &ctx).unwrap(), true);
            handler.run(&set, &mut ctx).await.unwrap();

            let lookup = ChatLine {
                user: "viewer",
                text: ">>greet",
                fact: &fact,
            };
            assert_eq!(handler.matches(&lookup, &ctx).unwrap(), true);
            handler.run(&lookup, &mut ctx).await.unwrap();
        });

        let sent = testutil::sent(&mut rx);
        assert_eq!(sent, vec!["'greet' saved".to_string(), "Hello there!".to_string()]);
    }

    #[test]
    fn test_unprivileged_user_cannot_edit() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let config = seed_config("chan");
        let mut handler = construct(&store, &config);
        let (mut ctx, mut rx) = testutil::context_with_store("chan", store);

        let fact = ChatFact::default();
        task::block_on(async {
            let set = ChatLine {
                user: "viewer",
                text: ">>reply set greet hi",
                fact: &fact,
            };
            handler.run(&set, &mut ctx).await.unwrap();

            let lookup = ChatLine {
                user: "viewer",
                text: ">>greet",
                fact: &fact,
            };
            assert_eq!(handler.matches(&lookup, &ctx).unwrap(), false);
        });

        assert!(testutil::sent(&mut rx).is_empty());
    }

    #[test]
    fn test_table_survives_reconstruction() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let config = seed_config("chan");
        let mut handler = construct(&store, &config);
        let (mut ctx, mut _rx) = testutil::context_with_store("chan", store.clone());
        ctx.presence.set_mod("somemod", true);

        let fact = ChatFact::default();
        task::block_on(async {
            let set = ChatLine {
                user: "somemod",
                text: ">>reply set lurk enjoy the lurk",
                fact: &fact,
            };
            handler.run(&set, &mut ctx).await.unwrap();
        });

        let rebuilt = construct(&store, &config);
        let lookup = ChatLine {
            user: "viewer",
            text: ">>lurk",
            fact: &fact,
        };
        assert_eq!(rebuilt.matches(&lookup, &ctx).unwrap(), true);
    }

    #[test]
    fn test_unset_removes_the_word() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let config = seed_config("chan");
        let mut handler = construct(&store, &config);
        let (mut ctx, mut rx) = testutil::context_with_store("chan", store);
        ctx.presence.set_mod("somemod", true);

        let fact = ChatFact::default();
        task::block_on(async {
            let set = ChatLine {
                user: "somemod",
                text: ">>reply set greet hi",
                fact: &fact,
            };
            handler.run(&set, &mut ctx).await.unwrap();
            let unset = ChatLine {
                user: "somemod",
                text: ">>reply unset greet",
                fact: &fact,
            };
            handler.run(&unset, &mut ctx).await.unwrap();

            let lookup = ChatLine {
                user: "viewer",
                text: ">>greet",
                fact: &fact,
            };
            assert_eq!(handler.matches(&lookup, &ctx).unwrap(), false);
        });

        let sent = testutil::sent(&mut rx);
        assert_eq!(sent, vec!["'greet' saved".to_string(), "'greet' dropped".to_string()]);
    }
}
