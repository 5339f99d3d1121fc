/// Ordered list of feature columns fed to the model.
///
/// Names and order follow the column layout of the python `ta` package's
/// `add_all_ta_features`, which the networks were trained on. Models are
/// checked against [`feature_count`] when loaded; values are computed with
/// the package's default windows but are not guaranteed to be bit-identical.
pub const FEATURE_NAMES: &[&str] = &[
    // Volume
    "volume_adi",
    "volume_obv",
    "volume_cmf",
    "volume_fi",
    "volume_em",
    "volume_sma_em",
    "volume_vpt",
    "volume_vwap",
    "volume_mfi",
    "volume_nvi",
    // Volatility
    "volatility_bbm",
    "volatility_bbh",
    "volatility_bbl",
    "volatility_bbw",
    "volatility_bbp",
    "volatility_bbhi",
    "volatility_bbli",
    "volatility_kcc",
    "volatility_kch",
    "volatility_kcl",
    "volatility_kcw",
    "volatility_kcp",
    "volatility_kchi",
    "volatility_kcli",
    "volatility_dcl",
    "volatility_dch",
    "volatility_dcm",
    "volatility_dcw",
    "volatility_dcp",
    "volatility_atr",
    "volatility_ui",
    // Trend
    "trend_macd",
    "trend_macd_signal",
    "trend_macd_diff",
    "trend_sma_fast",
    "trend_sma_slow",
    "trend_ema_fast",
    "trend_ema_slow",
    "trend_vortex_ind_pos",
    "trend_vortex_ind_neg",
    "trend_vortex_ind_diff",
    "trend_trix",
    "trend_mass_index",
    "trend_dpo",
    "trend_kst",
    "trend_kst_sig",
    "trend_kst_diff",
    "trend_ichimoku_conv",
    "trend_ichimoku_base",
    "trend_ichimoku_a",
    "trend_ichimoku_b",
    "trend_stc",
    "trend_adx",
    "trend_adx_pos",
    "trend_adx_neg",
    "trend_cci",
    "trend_visual_ichimoku_a",
    "trend_visual_ichimoku_b",
    "trend_aroon_up",
    "trend_aroon_down",
    "trend_aroon_ind",
    "trend_psar_up",
    "trend_psar_down",
    "trend_psar_up_indicator",
    "trend_psar_down_indicator",
    // Momentum
    "momentum_rsi",
    "momentum_stoch_rsi",
    "momentum_stoch_rsi_k",
    "momentum_stoch_rsi_d",
    "momentum_tsi",
    "momentum_uo",
    "momentum_stoch",
    "momentum_stoch_signal",
    "momentum_wr",
    "momentum_ao",
    "momentum_roc",
    "momentum_ppo",
    "momentum_ppo_signal",
    "momentum_ppo_hist",
    "momentum_pvo",
    "momentum_pvo_signal",
    "momentum_pvo_hist",
    "momentum_kama",
    // Returns
    "others_dr",
    "others_dlr",
    "others_cr",
];

/// Raw candle columns that never reach the scaler or the model.
pub const EXCLUDED_COLUMNS: &[&str] = &["open_time", "open", "close", "low", "high", "volume"];

pub fn feature_count() -> usize {
    FEATURE_NAMES.len()
}

pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// Value used for a column that has no defined value yet (warm-up).
///
/// Undefined values repeat the last defined value of their column; before
/// the first one the column gets this value.
pub fn fill_value(name: &str) -> f64 {
    match name {
        "volume_mfi" | "momentum_rsi" | "momentum_stoch" | "momentum_stoch_signal" => 50.0,
        "momentum_wr" => -50.0,
        "volatility_bbm" | "volatility_bbh" | "volatility_bbl" | "volatility_kcc"
        | "volatility_kch" | "volatility_kcl" | "volatility_dcl" | "volatility_dch"
        | "volatility_dcm" | "trend_psar_up" | "trend_psar_down" => -1.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_feature_names_are_unique() {
        let unique: HashSet<_> = FEATURE_NAMES.iter().collect();
        assert_eq!(unique.len(), FEATURE_NAMES.len());
    }

    #[test]
    fn test_full_indicator_layout() {
        assert_eq!(feature_count(), 86);
        let group = |prefix: &str| {
            FEATURE_NAMES
                .iter()
                .filter(|n| n.starts_with(prefix))
                .count()
        };
        assert_eq!(group("volume_"), 10);
        assert_eq!(group("volatility_"), 21);
        assert_eq!(group("trend_"), 34);
        assert_eq!(group("momentum_"), 18);
        assert_eq!(group("others_"), 3);
    }

    #[test]
    fn test_raw_columns_are_not_features() {
        for column in EXCLUDED_COLUMNS {
            assert!(feature_index(column).is_none(), "{} leaked", column);
        }
    }

    #[test]
    fn test_feature_index() {
        assert_eq!(feature_index("volume_adi"), Some(0));
        assert_eq!(feature_index("volume_nvi"), Some(9));
        assert_eq!(feature_index("volatility_bbm"), Some(10));
        assert_eq!(feature_index("trend_macd"), Some(31));
        assert_eq!(feature_index("momentum_rsi"), Some(65));
        assert_eq!(feature_index("others_cr"), Some(feature_count() - 1));
    }

    #[test]
    fn test_fill_values() {
        assert_eq!(fill_value("momentum_rsi"), 50.0);
        assert_eq!(fill_value("momentum_wr"), -50.0);
        assert_eq!(fill_value("volatility_bbm"), -1.0);
        assert_eq!(fill_value("trend_dpo"), 0.0);
    }
}
