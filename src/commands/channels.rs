use crate::cli::{channel_kind_label, label_direct_messages, ChannelsArgs};
use crate::config::Config;
use crate::error::AppError;

pub async fn list_channels(config: &Config, args: ChannelsArgs) -> Result<(), AppError> {
    let session = super::connect(config).await?;
    let mut channels = session
        .cache
        .channels(session.api.as_ref(), &config.retry, args.refresh)
        .await?;
    if channels.iter().any(|c| c.is_im) {
        let users = session
            .cache
            .users(session.api.as_ref(), &config.retry, args.refresh)
            .await?;
        label_direct_messages(&mut channels, &users);
    }

    let shown: Vec<_> = channels.iter().filter(|c| args.filter.matches(c)).collect();
    for (i, channel) in shown.iter().enumerate() {
        let archived = if channel.is_archived { " (archived)" } else { "" };
        let members = channel
            .member_count
            .map(|n| format!(" [{} members]", n))
            .unwrap_or_default();
        println!(
            "{:>4}. {:<40} {:<12} {:<8}{}{}",
            i + 1,
            channel.display_name(),
            channel.id,
            channel_kind_label(channel),
            members,
            archived
        );
    }
    println!("\n{} of {} channels", shown.len(), channels.len());
    Ok(())
}
