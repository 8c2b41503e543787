use bot::bot::HandlerRegistry;

mod botctl;
use botctl::BotCtl;

mod guess;
use guess::Guess;

mod help;
use help::Help;

mod pyramid;
use pyramid::Pyramid;

mod reply;
use reply::Reply;

/// Handler constructors the per-channel rosters may refer to by name.
pub fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register("reply", Reply::construct);
    registry.register("pyramid", |_| Ok(Box::new(Pyramid::new())));
    registry.register("guess", |_| Ok(Box::new(Guess::new(guess::standard_hints()))));
    registry.register("botctl", |_| Ok(Box::new(BotCtl)));
    registry.register("help", |_| Ok(Box::new(Help)));
    registry
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_the_shipped_names() {
        let registry = registry();
        for name in &["reply", "pyramid", "guess", "botctl", "help"] {
            assert!(registry.contains(name), "missing '{}'", name);
        }
        assert!(!registry.contains("no_such_handler"));
    }
}
