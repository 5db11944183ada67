//! Built-in message templates for market, strategy and system alerts

pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "price_alert",
        "{{symbol}} on {{exchange}}: price {{price}} {{operator}} {{threshold}} (previous {{previous}})",
    ),
    (
        "volume_alert",
        "{{symbol}} on {{exchange}}: volume {{volume}} {{operator}} {{threshold}}",
    ),
    (
        "volatility_alert",
        "{{symbol}} on {{exchange}}: volatility {{volatility}}% {{operator}} {{threshold}}%",
    ),
    (
        "arbitrage_alert",
        "{{symbol}} arbitrage {{exchange}} vs {{other_exchange}}: spread {{spread_pct}}% {{operator}} {{threshold}}%",
    ),
    (
        "strategy_signal",
        "{{strategy}} {{action}} {{symbol}} @ {{price}} (confidence {{confidence}})",
    ),
    (
        "strategy_performance",
        "{{strategy}}: {{metric}} {{value}} {{operator}} {{threshold}}",
    ),
    (
        "strategy_risk",
        "{{strategy}} risk: {{metric}} {{value}} {{operator}} {{threshold}}",
    ),
    ("system_event", "[{{source}}] {{message}}"),
];
