use crate::analysis::Trend;
use crate::dashboard::{Dashboard, DashboardError};
use std::fmt::Write;

const PAGE_HEAD: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Stock Dashboard | AI Prediction</title>
<style>
  body { font-family: 'Segoe UI', Arial; background: #0d1117; color: #e6edf3; margin: 0; }
  header { background: #161b22; padding: 20px; text-align: center; color: #58a6ff; font-size: 28px; }
  .container { max-width: 950px; margin: 40px auto; background: #161b22; padding: 30px; border-radius: 12px; box-shadow: 0 0 25px rgba(0,0,0,0.4); text-align: center; }
  input[type=text] { width: 70%; padding: 12px; border: none; border-radius: 6px; background: #21262d; color: #fff; }
  button { padding: 12px 20px; border: none; border-radius: 6px; background: #238636; color: white; cursor: pointer; }
  button:hover { background: #2ea043; }
  img { width: 100%; height: auto; border-radius: 10px; margin-top: 25px; box-shadow: 0 0 10px rgba(0,0,0,0.6); }
  .error { color: #f85149; }
  .price-box { text-align: center; margin-top: 25px; }
  .price { font-size: 48px; font-weight: bold; }
  .change { font-size: 20px; }
  .up { color: #00ff7f; }
  .down { color: #f85149; }
  .stable { color: #ccc; }
  .pred-box { margin-top: 30px; text-align: center; background: #21262d; padding: 20px; border-radius: 10px; }
  .pred { font-size: 22px; color: #ffcc00; }
  .note { text-align: center; color: #8b949e; margin-top: 15px; font-size: 13px; }
</style>
</head>
<body>
<header>📈 AI Stock Dashboard</header>
<div class="container">
  <form method="post">
    <input type="text" name="ticker" placeholder="Enter Stock Symbol (e.g. TSLA, AAPL)" required>
    <button type="submit">Analyze</button>
  </form>
"#;

const PAGE_TAIL: &str = "</div>\n</body>\n</html>\n";

/// What the page shows below the form.
pub enum PageContent<'a> {
    Blank,
    Error(&'a DashboardError),
    Results(&'a Dashboard),
}

pub fn render_page(content: PageContent<'_>) -> String {
    let mut html = String::with_capacity(PAGE_HEAD.len() + 4096);
    html.push_str(PAGE_HEAD);

    match content {
        PageContent::Blank => {}
        PageContent::Error(error) => {
            let _ = writeln!(html, "  <p class=\"error\">{}</p>", escape_html(&error.to_string()));
        }
        PageContent::Results(dashboard) => push_results(&mut html, dashboard),
    }

    html.push_str(PAGE_TAIL);
    html
}

fn push_results(html: &mut String, dashboard: &Dashboard) {
    let stats = &dashboard.stats;
    let sign = if stats.trend == Trend::Up { "+" } else { "" };

    let _ = write!(
        html,
        r#"  <div class="price-box">
    <h2>{name} ({ticker})</h2>
    <div class="price">${price:.2}</div>
    <div class="change {trend}">{sign}{change:.2} ({change_percent:.2}%)</div>
  </div>
  <div class="pred-box">
    <p class="pred">🔮 Predicted Tomorrow's Close: <b>${predicted:.2}</b></p>
  </div>
  <img src="data:image/png;base64,{chart}" width="{chart_width}" height="{chart_height}" alt="{ticker} price chart">
  <div class="note">5-Year Historical Stock Price (AI Linear Regression Prediction for Next Day)</div>
"#,
        name = escape_html(&dashboard.name),
        ticker = escape_html(&dashboard.ticker),
        price = stats.price,
        trend = stats.trend,
        sign = sign,
        change = stats.change,
        change_percent = stats.change_percent,
        predicted = dashboard.predicted_price,
        chart = dashboard.chart.to_base64(),
        chart_width = dashboard.chart.width,
        chart_height = dashboard.chart.height,
    );
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
