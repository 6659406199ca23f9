//! Opportunity finder.
//!
//! Scores every (market, side) pair against the probability model and
//! the cycle's signal snapshots, applies the pre-sizing filters, and
//! ranks survivors by adjusted edge. Ranking is deterministic: ties
//! break by ticker string, then side.

use std::collections::HashMap;

use autotrader_core::model::BinaryPricer;
use autotrader_core::policy::PolicyParams;
use autotrader_core::types::{Asset, AssetFamily, Market, MarketStatus, Regime, Side};
use autotrader_signals::{dynamic_min_edge, SignalSnapshot, WeatherSnapshot};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::opportunity::{
    base_opportunity, FinderOutcome, Opportunity, SkipReason, SkippedCandidate,
};

/// All cycle inputs the finder scores against.
pub struct FinderInputs<'a> {
    pub markets: &'a [Market],
    /// Per-asset crypto snapshots; an absent asset drops its markets.
    pub crypto: &'a HashMap<Asset, SignalSnapshot>,
    /// Weather forecasts keyed by market ticker.
    pub weather: &'a HashMap<String, WeatherSnapshot>,
    pub now: DateTime<Utc>,
}

pub struct OpportunityFinder {
    pricer: BinaryPricer,
}

impl OpportunityFinder {
    #[must_use]
    pub fn new(pricer: BinaryPricer) -> Self {
        Self { pricer }
    }

    #[must_use]
    pub fn from_policy(policy: &PolicyParams) -> Self {
        Self::new(BinaryPricer {
            weather_calibration_factor: policy.weather.calibration_factor,
            ..BinaryPricer::default()
        })
    }

    /// Scores one cycle's markets. Pure: the same inputs produce the
    /// same ranked output.
    #[must_use]
    pub fn find(&self, inputs: &FinderInputs<'_>, policy: &PolicyParams) -> FinderOutcome {
        let mut outcome = FinderOutcome::default();

        for market in inputs.markets {
            if market.status != MarketStatus::Open {
                continue;
            }
            for side in [Side::Yes, Side::No] {
                match self.score(market, side, inputs, policy) {
                    Ok(Some(opp)) => outcome.opportunities.push(opp),
                    Ok(None) => {}
                    Err(reason) => outcome.skips.push(SkippedCandidate {
                        ticker: market.ticker.clone(),
                        side,
                        reason,
                    }),
                }
            }
        }

        outcome.opportunities.sort_by(|a, b| {
            b.edge_adj
                .total_cmp(&a.edge_adj)
                .then_with(|| a.ticker.cmp(&b.ticker))
                .then_with(|| a.side.as_str().cmp(b.side.as_str()))
        });
        outcome.opportunities.truncate(policy.filters.top_k);

        debug!(
            candidates = outcome.opportunities.len(),
            skips = outcome.skips.len(),
            "finder pass complete"
        );
        outcome
    }

    /// `Ok(None)` means the asset had no snapshot or the side simply has
    /// no edge worth recording; `Err` carries a skip reason for the
    /// ledger.
    fn score(
        &self,
        market: &Market,
        side: Side,
        inputs: &FinderInputs<'_>,
        policy: &PolicyParams,
    ) -> Result<Option<Opportunity>, SkipReason> {
        let filters = &policy.filters;

        if !market.book_is_coherent(filters.spread_tolerance_cents) {
            return Err(SkipReason::IncoherentBook);
        }
        if market.minutes_to_expiry(inputs.now) < filters.min_minutes_to_expiry {
            return Err(SkipReason::TooCloseToExpiry);
        }
        let ask = market.ask_cents(side);
        if ask <= filters.extreme_price_low_cents || ask >= filters.extreme_price_high_cents {
            return Err(SkipReason::ExtremePrice);
        }

        let mut opp = match &market.family {
            AssetFamily::CryptoBtc | AssetFamily::CryptoEth => {
                let asset = match market.family.crypto_asset() {
                    Some(a) => a,
                    None => return Ok(None),
                };
                let Some(snap) = inputs.crypto.get(&asset) else {
                    return Ok(None);
                };
                self.score_crypto(market, side, snap, inputs.now)
            }
            AssetFamily::WeatherHigh { .. } | AssetFamily::WeatherLow { .. } => {
                let Some(snap) = inputs.weather.get(&market.ticker) else {
                    return Ok(None);
                };
                self.score_weather(market, side, snap, policy, inputs.now)?
            }
        };

        if opp.our_prob < filters.prob_floor {
            return Err(SkipReason::ModelProbFloor);
        }
        if opp.market_prob > filters.conviction_ceiling {
            return Err(SkipReason::ConvictionCeiling);
        }
        if opp.edge_adj <= 0.0 {
            return Err(SkipReason::NoEdge);
        }

        // Crypto candidates against strong opposing momentum are vetoed
        // even when the raw edge survives the penalty.
        if let Some(asset) = market.family.crypto_asset() {
            if let Some(snap) = inputs.crypto.get(&asset) {
                if snap.momentum.strongly_opposes(side) {
                    return Err(SkipReason::MomentumVeto);
                }
                // Low-confidence trends and elevated vol demand more
                // edge than the static regime floor alone.
                let floor = dynamic_min_edge(&snap.regime).max(policy.edges.hard_floor);
                if opp.edge_adj < floor {
                    return Err(SkipReason::DynamicEdgeFloor);
                }
            }
        }

        opp.minutes_to_expiry = market.minutes_to_expiry(inputs.now);
        Ok(Some(opp))
    }

    fn score_crypto(
        &self,
        market: &Market,
        side: Side,
        snap: &SignalSnapshot,
        now: DateTime<Utc>,
    ) -> Opportunity {
        let hours = (market.expiry - now).num_minutes() as f64 / 60.0;
        let p_yes = self.pricer.prob_above_strike(
            snap.spot,
            market.strike,
            snap.vol.realized_hourly,
            hours,
        );
        let our_prob = match side {
            Side::Yes => p_yes,
            Side::No => 1.0 - p_yes,
        };

        let mut opp = base_opportunity(market, side, now, our_prob, snap.regime.regime);
        opp.spot = Some(snap.spot);
        opp.momentum_dir = snap.momentum.direction.as_i8();
        opp.momentum_aligned = snap.momentum.supports(side);
        opp.vol_ratio = snap.vol.ratio;
        opp.vol_aligned = snap.vol.aligned_with(side);

        opp.momentum_bonus = snap.momentum.prob_adjustment(side);
        opp.vol_bonus = snap.vol.edge_bonus(side);
        opp.news_bonus = match (&snap.news, side) {
            (Some(news), Side::Yes) => news.yes_prob_bonus(),
            (Some(news), Side::No) => -news.yes_prob_bonus(),
            (None, _) => 0.0,
        };
        opp.regime_bonus = regime_bonus(snap.regime.regime, opp.edge);
        opp.edge_adj =
            opp.edge + opp.momentum_bonus + opp.vol_bonus + opp.news_bonus + opp.regime_bonus;
        opp
    }

    fn score_weather(
        &self,
        market: &Market,
        side: Side,
        snap: &WeatherSnapshot,
        policy: &PolicyParams,
        now: DateTime<Utc>,
    ) -> Result<Opportunity, SkipReason> {
        let weather = &policy.weather;
        let gap = (snap.forecast_f - market.strike).abs();

        // A threshold inside the central body of the forecast
        // distribution is a coin flip we have no business pricing.
        if snap.uncertainty_f > 0.0 && gap / snap.uncertainty_f < weather.central_band_z {
            return Err(SkipReason::CentralBand);
        }
        // Small gaps only trade when the forecast itself is wide enough
        // that the tails still carry real probability mass.
        if gap < weather.min_gap_f && snap.uncertainty_f < weather.uncertainty_override_f {
            return Err(SkipReason::ForecastGapInsufficient);
        }

        let Some(p_yes) = self.pricer.weather_yes_prob(
            snap.kind,
            market.strike,
            snap.forecast_f,
            snap.uncertainty_f,
        ) else {
            return Err(SkipReason::ForecastGapInsufficient);
        };
        let our_prob = match side {
            Side::Yes => p_yes,
            Side::No => 1.0 - p_yes,
        };

        // Weather gets no momentum or vol treatment; the regime label
        // still rides along for the ledger.
        Ok(base_opportunity(market, side, now, our_prob, Regime::Ranging))
    }
}

/// Directional bets pay a penalty in choppy conditions; in a quiet
/// range, fading a clearly mispriced side earns a small bonus.
fn regime_bonus(regime: Regime, raw_edge: f64) -> f64 {
    match regime {
        Regime::Volatile => -0.02,
        Regime::Ranging if raw_edge.abs() >= 0.10 => 0.01,
        Regime::Trending | Regime::Ranging => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotrader_core::types::Candle;
    use autotrader_core::types::WeatherKind;
    use autotrader_signals::momentum::momentum;
    use autotrader_signals::regime::RegimeTracker;
    use autotrader_signals::volatility::vol_reading;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 28, 14, 0, 0).unwrap()
    }

    fn crypto_market(ticker: &str, strike: f64, yes_ask: i64) -> Market {
        Market {
            ticker: ticker.to_string(),
            family: AssetFamily::CryptoBtc,
            strike,
            expiry: now() + Duration::hours(1),
            yes_ask_cents: yes_ask,
            no_ask_cents: 100 - yes_ask,
            status: MarketStatus::Open,
            result: None,
        }
    }

    fn flat_candles(close: f64, n: usize) -> Vec<Candle> {
        let start = now() - Duration::hours(n as i64);
        (0..n)
            .map(|i| Candle {
                open_time: start + Duration::hours(i as i64),
                open: close,
                high: close * 1.002,
                low: close * 0.998,
                close,
                volume: 5.0,
            })
            .collect()
    }

    fn snapshot(spot: f64, candles: Vec<Candle>) -> SignalSnapshot {
        let m = momentum(&candles);
        let mut tracker = RegimeTracker::new();
        let regime = tracker.observe(&candles, &m);
        SignalSnapshot {
            asset: Asset::Btc,
            spot,
            vol: vol_reading(&candles, 0.005, 0.001, 0.05),
            momentum: m,
            regime,
            news: None,
            candles,
        }
    }

    fn inputs<'a>(
        markets: &'a [Market],
        crypto: &'a HashMap<Asset, SignalSnapshot>,
        weather: &'a HashMap<String, WeatherSnapshot>,
    ) -> FinderInputs<'a> {
        FinderInputs {
            markets,
            crypto,
            weather,
            now: now(),
        }
    }

    #[test]
    fn deep_itm_yes_surfaces_with_positive_edge() {
        // Spot well above strike, YES priced at 55: the model says ~93%.
        let markets = vec![crypto_market("KXBTCD-26JAN2810-T67500.00", 67_500.0, 55)];
        let mut crypto = HashMap::new();
        crypto.insert(Asset::Btc, snapshot(68_000.0, flat_candles(68_000.0, 30)));
        let weather = HashMap::new();

        let finder = OpportunityFinder::new(BinaryPricer::default());
        let outcome = finder.find(&inputs(&markets, &crypto, &weather), &PolicyParams::default());

        assert_eq!(outcome.opportunities.len(), 1);
        let opp = &outcome.opportunities[0];
        assert_eq!(opp.side, Side::Yes);
        assert!(opp.our_prob > 0.9, "prob {}", opp.our_prob);
        assert!(opp.edge > 0.3);
        // The NO side collapses to the clamped 1% and drops at the floor.
        assert!(outcome
            .skips
            .iter()
            .any(|s| s.side == Side::No && s.reason == SkipReason::ModelProbFloor));
    }

    #[test]
    fn extreme_prices_and_stale_expiries_are_skipped() {
        let mut extreme = crypto_market("KXBTCD-26JAN2810-T60000.00", 60_000.0, 97);
        extreme.no_ask_cents = 3;
        let mut closing = crypto_market("KXBTCD-26JAN2810-T67500.00", 67_500.0, 55);
        closing.expiry = now() + Duration::minutes(20);
        let markets = vec![extreme, closing];
        let mut crypto = HashMap::new();
        crypto.insert(Asset::Btc, snapshot(68_000.0, flat_candles(68_000.0, 30)));
        let weather = HashMap::new();

        let finder = OpportunityFinder::new(BinaryPricer::default());
        let outcome = finder.find(&inputs(&markets, &crypto, &weather), &PolicyParams::default());

        assert!(outcome.opportunities.is_empty());
        let reasons: Vec<SkipReason> = outcome.skips.iter().map(|s| s.reason).collect();
        assert!(reasons.contains(&SkipReason::ExtremePrice));
        assert!(reasons.contains(&SkipReason::TooCloseToExpiry));
    }

    #[test]
    fn incoherent_book_is_rejected() {
        let mut market = crypto_market("KXBTCD-26JAN2810-T67500.00", 67_500.0, 60);
        market.no_ask_cents = 60; // sums to 120, past the tolerance
        let markets = vec![market];
        let mut crypto = HashMap::new();
        crypto.insert(Asset::Btc, snapshot(68_000.0, flat_candles(68_000.0, 30)));
        let weather = HashMap::new();

        let finder = OpportunityFinder::new(BinaryPricer::default());
        let outcome = finder.find(&inputs(&markets, &crypto, &weather), &PolicyParams::default());
        assert!(outcome
            .skips
            .iter()
            .all(|s| s.reason == SkipReason::IncoherentBook));
    }

    #[test]
    fn market_without_snapshot_is_dropped_silently() {
        let markets = vec![crypto_market("KXBTCD-26JAN2810-T67500.00", 67_500.0, 55)];
        let crypto = HashMap::new();
        let weather = HashMap::new();

        let finder = OpportunityFinder::new(BinaryPricer::default());
        let outcome = finder.find(&inputs(&markets, &crypto, &weather), &PolicyParams::default());
        assert!(outcome.opportunities.is_empty());
        assert!(outcome.skips.is_empty());
    }

    #[test]
    fn weather_central_band_and_gap_rules() {
        let mk = |ticker: &str, threshold: f64| Market {
            ticker: ticker.to_string(),
            family: AssetFamily::WeatherHigh {
                city: "CHI".to_string(),
            },
            strike: threshold,
            expiry: now() + Duration::hours(8),
            yes_ask_cents: 40,
            no_ask_cents: 60,
            status: MarketStatus::Open,
            result: None,
        };
        let snap = |threshold_ticker: &str, uncertainty: f64| {
            (
                threshold_ticker.to_string(),
                WeatherSnapshot {
                    city: "CHI".to_string(),
                    date: now().date_naive(),
                    kind: WeatherKind::High,
                    forecast_f: 40.0,
                    uncertainty_f: uncertainty,
                },
            )
        };

        // Threshold 41 with sigma 3: inside the central band.
        // Threshold 48 with sigma 3: clear gap, NO is heavily favored.
        let markets = vec![
            mk("KXHIGHCHI-26JAN28-B41", 41.0),
            mk("KXHIGHCHI-26JAN28-B48", 48.0),
        ];
        let weather: HashMap<String, WeatherSnapshot> = vec![
            snap("KXHIGHCHI-26JAN28-B41", 3.0),
            snap("KXHIGHCHI-26JAN28-B48", 3.0),
        ]
        .into_iter()
        .collect();
        let crypto = HashMap::new();

        let finder = OpportunityFinder::new(BinaryPricer::default());
        let outcome = finder.find(&inputs(&markets, &crypto, &weather), &PolicyParams::default());

        assert!(outcome
            .skips
            .iter()
            .any(|s| s.ticker.ends_with("B41") && s.reason == SkipReason::CentralBand));
        let surfaced: Vec<&Opportunity> = outcome
            .opportunities
            .iter()
            .filter(|o| o.ticker.ends_with("B48"))
            .collect();
        assert_eq!(surfaced.len(), 1);
        assert_eq!(surfaced[0].side, Side::No);
        assert!(surfaced[0].our_prob > 0.9);
    }

    #[test]
    fn dynamic_floor_vetoes_modest_edges_in_rough_regimes() {
        use autotrader_core::types::Regime;
        use autotrader_signals::volatility::VolClass;

        // Deep ITM priced at 84: about 15 points of raw edge, enough
        // for a quiet range but not for a very-high-vol volatile tape
        // where the floor tightens to 17 points.
        let markets = vec![crypto_market("KXBTCD-26JAN2810-T66000.00", 66_000.0, 84)];
        let weather = HashMap::new();
        let finder = OpportunityFinder::new(BinaryPricer::default());

        let mut crypto = HashMap::new();
        crypto.insert(Asset::Btc, snapshot(68_000.0, flat_candles(68_000.0, 30)));
        let outcome = finder.find(&inputs(&markets, &crypto, &weather), &PolicyParams::default());
        assert!(outcome
            .opportunities
            .iter()
            .any(|o| o.side == Side::Yes), "quiet range should surface the candidate");

        let mut rough = snapshot(68_000.0, flat_candles(68_000.0, 30));
        rough.regime.regime = Regime::Volatile;
        rough.regime.vol_class = VolClass::VeryHigh;
        crypto.insert(Asset::Btc, rough);
        let outcome = finder.find(&inputs(&markets, &crypto, &weather), &PolicyParams::default());
        assert!(outcome
            .skips
            .iter()
            .any(|s| s.side == Side::Yes && s.reason == SkipReason::DynamicEdgeFloor));
    }

    #[test]
    fn ranking_is_deterministic_with_ties_on_ticker() {
        let markets = vec![
            crypto_market("KXBTCD-26JAN2810-T67600.00", 67_600.0, 55),
            crypto_market("KXBTCD-26JAN2810-T67500.00", 67_500.0, 55),
        ];
        let mut crypto = HashMap::new();
        crypto.insert(Asset::Btc, snapshot(68_000.0, flat_candles(68_000.0, 30)));
        let weather = HashMap::new();

        let finder = OpportunityFinder::new(BinaryPricer::default());
        let a = finder.find(&inputs(&markets, &crypto, &weather), &PolicyParams::default());
        let b = finder.find(&inputs(&markets, &crypto, &weather), &PolicyParams::default());

        let order_a: Vec<&str> = a.opportunities.iter().map(|o| o.ticker.as_str()).collect();
        let order_b: Vec<&str> = b.opportunities.iter().map(|o| o.ticker.as_str()).collect();
        assert_eq!(order_a, order_b);
        // Lower strike prices closer to certainty rank first.
        assert_eq!(order_a[0], "KXBTCD-26JAN2810-T67500.00");
    }

    #[test]
    fn top_k_truncates_the_ranking() {
        let markets: Vec<Market> = (0..15)
            .map(|i| {
                crypto_market(
                    &format!("KXBTCD-26JAN2810-T{}", 66_000 + i * 100),
                    66_000.0 + f64::from(i) * 100.0,
                    50,
                )
            })
            .collect();
        let mut crypto = HashMap::new();
        crypto.insert(Asset::Btc, snapshot(68_000.0, flat_candles(68_000.0, 30)));
        let weather = HashMap::new();

        let mut policy = PolicyParams::default();
        policy.filters.top_k = 4;
        let finder = OpportunityFinder::new(BinaryPricer::default());
        let outcome = finder.find(&inputs(&markets, &crypto, &weather), &policy);
        assert!(outcome.opportunities.len() <= 4);
    }
}
