use chrono::Local;
use echo_core::api::{Account, AudienceMember, Campaign, Proxy};
use echo_core::services::audiences::display_name;
use echo_core::services::SettingsForm;
use textwrap::wrap;

pub fn render_accounts(accounts: &[Account]) {
    println!("{:<18} {:<20} {:<40}", "PHONE", "USERNAME", "TAGS");
    println!("{}", "-".repeat(80));
    for account in accounts {
        println!(
            "{:<18} {:<20} {:<40}",
            account.phone,
            truncate(account.username.as_deref().unwrap_or("N/A"), 20),
            truncate(&account.settings.tags.join(", "), 40)
        );
    }
}

pub fn render_settings_form(form: &SettingsForm) {
    let profile = &form.profile;
    println!("Account   : {}", form.phone);
    println!("First name: {}", profile.first_name);
    println!("Last name : {}", profile.last_name);
    if !profile.avatar_path.is_empty() {
        println!("Avatar    : {}", profile.avatar_path);
    }
    println!(
        "UA        : {} / Chrome {}",
        form.user_agent.os, form.user_agent.chrome
    );
    if !form.user_agent.full_string.is_empty() {
        for line in wrap(&form.user_agent.full_string, 68) {
            println!("            {}", line);
        }
    }
    let proxy = form
        .selected_proxy()
        .map(Proxy::label)
        .unwrap_or_else(|| "none".into());
    println!("Proxy     : {}", proxy);

    let tags = form
        .tags
        .iter()
        .map(|tag| {
            if tag.applied {
                format!("[x] {}", tag.name)
            } else {
                format!("[ ] {}", tag.name)
            }
        })
        .collect::<Vec<_>>();
    if !tags.is_empty() {
        println!("Tags      : {}", tags.join("  "));
    }

    let bio = profile.bio.trim();
    if !bio.is_empty() {
        println!();
        for line in wrap(bio, 80) {
            println!("{}", line);
        }
    }

    if form.proxy_options.len() > 1 || form.selected_proxy().is_none() {
        println!();
        println!("Available proxies:");
        render_proxies(&form.proxy_options);
    }
}

pub fn render_proxies(proxies: &[Proxy]) {
    println!("{:<10} {:<28} {:<8} {:<16}", "ID", "ADDRESS", "TYPE", "USER");
    println!("{}", "-".repeat(64));
    for proxy in proxies {
        println!(
            "{:<10} {:<28} {:<8} {:<16}",
            truncate(&proxy.id.to_string(), 10),
            truncate(&format!("{}:{}", proxy.host, proxy.port), 28),
            proxy.kind.to_string().to_uppercase(),
            truncate(proxy.user.as_deref().unwrap_or("N/A"), 16)
        );
    }
}

pub fn render_tags(tags: &[String]) {
    if tags.is_empty() {
        println!("No tags defined.");
        return;
    }
    for tag in tags {
        println!("{}", tag);
    }
}

pub fn render_audiences(files: &[String]) {
    if files.is_empty() {
        println!("No saved audiences.");
        return;
    }
    for file in files {
        println!("{}", display_name(file));
    }
}

pub fn render_audience_members(users: &[AudienceMember]) {
    println!("{:<14} {:<24} {:<24} {:<16}", "ID", "USERNAME", "NAME", "PHONE");
    println!("{}", "-".repeat(80));
    for user in users {
        println!(
            "{:<14} {:<24} {:<24} {:<16}",
            truncate(&user.id.to_string(), 14),
            truncate(user.username.as_deref().unwrap_or("N/A"), 24),
            truncate(user.name.as_deref().unwrap_or("N/A"), 24),
            user.phone.as_deref().unwrap_or("N/A")
        );
    }
}

pub fn render_campaigns(campaigns: &[Campaign]) {
    println!(
        "{:<10} {:<20} {:<16} {:<10} {:<24} {:<20}",
        "ID", "NAME", "AUDIENCE", "PROGRESS", "STATUS", "CREATED"
    );
    println!("{}", "-".repeat(104));
    for campaign in campaigns {
        let created = campaign
            .created_at_utc()
            .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<10} {:<20} {:<16} {:<10} {:<24} {:<20}",
            truncate(&campaign.id.to_string(), 10),
            truncate(&campaign.name, 20),
            truncate(display_name(&campaign.audience_file), 16),
            campaign.progress_label(),
            truncate(campaign.status.as_deref().unwrap_or("-"), 24),
            created
        );
    }
}

pub fn truncate(value: &str, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        return value.to_owned();
    }
    let mut cut: String = value.chars().take(max_len.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
