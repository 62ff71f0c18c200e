use atb_core::{
    calc,
    formatting::{code, escape_html, truncate_chars},
    messaging::types::ChatAction,
    Result,
};
use atb_services::WeatherReport;

use super::Ctx;

/// Translation input and output are cut to this many characters.
const TRANSLATE_MAX_CHARS: usize = 500;

/// Arguments, or the replied message's text/caption when there are none.
fn text_or_reply(ctx: &Ctx<'_>) -> Option<String> {
    let args = ctx.args.trim();
    if !args.is_empty() {
        return Some(args.to_string());
    }
    ctx.replied()
        .and_then(|m| m.text().or_else(|| m.caption()))
        .map(str::to_string)
        .filter(|t| !t.trim().is_empty())
}

fn required_args<'a>(ctx: &'a Ctx<'_>, what: &str) -> Result<&'a str> {
    let args = ctx.args.trim();
    if args.is_empty() {
        return Err(ctx.usage_error(format!("Please provide {what}")));
    }
    Ok(args)
}

pub async fn calc(ctx: &Ctx<'_>) -> Result<()> {
    let expr = required_args(ctx, "an expression")?;
    let value = calc::evaluate(expr)?;

    ctx.reply(&format!(
        "🧮 <b>Calculator</b>\n\n<b>Expression:</b> {}\n<b>Result:</b> {}",
        code(expr),
        code(&calc::format_number(value))
    ))
    .await?;
    Ok(())
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn weather_html(r: &WeatherReport) -> String {
    let place = if r.country.is_empty() {
        escape_html(&r.city)
    } else {
        format!("{}, {}", escape_html(&r.city), escape_html(&r.country))
    };
    format!(
        "🌤️ <b>Weather in {place}</b>\n\n\
🌡️ <b>Temperature:</b> {:.1}°C\n\
🤔 <b>Feels Like:</b> {:.1}°C\n\
📊 <b>Condition:</b> {}\n\
💧 <b>Humidity:</b> {:.0}%\n\
💨 <b>Wind Speed:</b> {:.1} m/s\n\
☁️ <b>Cloudiness:</b> {:.0}%\n\
🔽 <b>Min Temp:</b> {:.1}°C\n\
🔼 <b>Max Temp:</b> {:.1}°C",
        r.temp,
        r.feels_like,
        escape_html(&title_case(&r.description)),
        r.humidity,
        r.wind_speed,
        r.cloudiness,
        r.temp_min,
        r.temp_max,
    )
}

pub async fn weather(ctx: &Ctx<'_>) -> Result<()> {
    let city = required_args(ctx, "a city name")?;
    let Some(client) = &ctx.state.weather else {
        ctx.reply(
            "❌ Weather API key not configured.\n\n\
Get a free API key from https://openweathermap.org/api",
        )
        .await?;
        return Ok(());
    };

    if let Err(e) = ctx
        .state
        .messenger
        .send_chat_action(ctx.inv.chat_id, ChatAction::Typing)
        .await
    {
        tracing::debug!("chat action failed: {e}");
    }

    let report = client.current(city).await?;
    ctx.reply(&weather_html(&report)).await?;
    Ok(())
}

pub async fn translate(ctx: &Ctx<'_>) -> Result<()> {
    let text = text_or_reply(ctx)
        .ok_or_else(|| ctx.usage_error("Provide text or reply to a message"))?;
    let text = truncate_chars(&text, TRANSLATE_MAX_CHARS);

    let translation = ctx.state.translator.to_english(&text).await?;
    ctx.reply(&format!(
        "🌐 <b>Translation</b>\n\n\
<b>From:</b> {}\n\
<b>To:</b> English\n\n\
<b>Original:</b>\n{}\n\n\
<b>Translated:</b>\n{}",
        escape_html(&translation.source_name()),
        escape_html(&text),
        escape_html(&truncate_chars(&translation.text, TRANSLATE_MAX_CHARS)),
    ))
    .await?;
    Ok(())
}

pub async fn echo(ctx: &Ctx<'_>) -> Result<()> {
    let text = required_args(ctx, "some text")?;
    ctx.reply(&escape_html(text)).await?;
    Ok(())
}

fn reversed(text: &str) -> String {
    text.chars().rev().collect()
}

pub async fn reverse(ctx: &Ctx<'_>) -> Result<()> {
    let text = required_args(ctx, "some text")?;
    ctx.reply(&format!(
        "🔄 <b>Reversed Text:</b>\n\n<b>Original:</b> {}\n<b>Reversed:</b> {}",
        escape_html(text),
        escape_html(&reversed(text))
    ))
    .await?;
    Ok(())
}

pub async fn uppercase(ctx: &Ctx<'_>) -> Result<()> {
    let text = text_or_reply(ctx)
        .ok_or_else(|| ctx.usage_error("Provide text or reply to a message"))?;
    ctx.reply(&escape_html(&text.to_uppercase())).await?;
    Ok(())
}

pub async fn lowercase(ctx: &Ctx<'_>) -> Result<()> {
    let text = text_or_reply(ctx)
        .ok_or_else(|| ctx.usage_error("Provide text or reply to a message"))?;
    ctx.reply(&escape_html(&text.to_lowercase())).await?;
    Ok(())
}
