use crate::args::ChannelsCommand;
use crate::commands::Out;
use crate::{App, Result};

/// Handles `fintrack channels list|add|remove`.
pub async fn channels(app: &App, command: &ChannelsCommand) -> Result<Out<Vec<String>>> {
    let methods = app.payment_methods();
    let (message, list) = match command {
        ChannelsCommand::List => {
            let list = methods.list()?;
            (list.join("\n"), list)
        }
        ChannelsCommand::Add { label } => {
            let list = methods.add(label)?;
            (format!("Payment methods: {}", list.join(", ")), list)
        }
        ChannelsCommand::Remove { label } => {
            let list = methods.remove(label)?;
            (format!("Payment methods: {}", list.join(", ")), list)
        }
    };
    Ok(Out::new(message, list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn add_and_remove_payment_methods() {
        let env = TestEnv::new().await;
        let app = env.app();

        let out = channels(&app, &ChannelsCommand::List).await.unwrap();
        assert!(out.structure().unwrap().contains(&"Cash".to_string()));

        let add = ChannelsCommand::Add {
            label: "PayPal".to_string(),
        };
        let out = channels(&app, &add).await.unwrap();
        assert!(out.message().contains("PayPal"));

        let remove = ChannelsCommand::Remove {
            label: "cash".to_string(),
        };
        let out = channels(&app, &remove).await.unwrap();
        assert!(!out.structure().unwrap().contains(&"Cash".to_string()));

        let blank = ChannelsCommand::Add {
            label: "  ".to_string(),
        };
        assert!(channels(&app, &blank).await.is_err());
    }
}
