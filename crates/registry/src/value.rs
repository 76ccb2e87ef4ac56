use std::fmt;
use std::path::PathBuf;

/// A single leaf cell of the registry tree.
/// 登錄樹中的單一葉節點；尚未寫入時為 null。
///
/// The cell only stores text. The type used to read it back is picked by the
/// caller through [`Value::get`] and the typed helpers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Value {
    raw: Option<String>,
}

impl Value {
    /// Creates a cell that has never been written.
    /// 建立尚未寫入的空值。
    pub fn null() -> Self {
        Self { raw: None }
    }

    /// Creates a cell holding the given text.
    /// 以指定字串建立數值。
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
        }
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    /// Stored text, `None` while null.
    /// 取得原始字串；null 時回傳 `None`。
    pub fn as_str(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Stores the display form of `value`.
    /// 以 `Display` 形式寫入數值。
    pub fn set(&mut self, value: impl fmt::Display) {
        self.raw = Some(value.to_string());
    }

    /// Stores a sequence as one space-joined string. Items must not contain
    /// whitespace or they will not read back as the same sequence.
    /// 以空白連接序列後寫入；元素本身不可含空白。
    pub fn set_list<I, T>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
        T: fmt::Display,
    {
        let joined = items
            .into_iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.raw = Some(joined);
    }

    /// Decodes the stored text as `T`, returning `default` when the cell is
    /// null or the text does not parse.
    /// 依型別 `T` 解碼；null 或解析失敗時回傳預設值。
    pub fn get<T: Decode>(&self, default: T) -> T {
        match self.raw.as_deref() {
            Some(raw) => T::decode(raw).unwrap_or(default),
            None => default,
        }
    }

    /// `true` only for `true`, `1` or `yes` (any case). Every other stored
    /// string reads as `false`.
    /// 僅 `true`/`1`/`yes`（不分大小寫）為真，其餘字串一律為假。
    pub fn get_bool(&self, default: bool) -> bool {
        self.get(default)
    }

    pub fn get_int(&self, default: i64) -> i64 {
        self.get(default)
    }

    pub fn get_float(&self, default: f64) -> f64 {
        self.get(default)
    }

    pub fn get_str<'a>(&'a self, default: &'a str) -> &'a str {
        self.raw.as_deref().unwrap_or(default)
    }

    /// Splits on whitespace and decodes every token; a single bad token makes
    /// the whole read fall back to `default`.
    /// 以空白切割後逐一解碼；任何一項失敗即回傳整個預設值。
    pub fn get_list<T: Decode>(&self, default: Vec<T>) -> Vec<T> {
        self.get(default)
    }
}

/// Conversion from the stored text of a [`Value`].
/// 將 [`Value`] 的原始字串轉換為具體型別。
pub trait Decode: Sized {
    /// Returns `None` when `raw` is not a valid representation.
    fn decode(raw: &str) -> Option<Self>;
}

impl Decode for bool {
    fn decode(raw: &str) -> Option<Self> {
        Some(["true", "1", "yes"].iter().any(|truthy| raw.eq_ignore_ascii_case(truthy)))
    }
}

macro_rules! decode_from_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Decode for $ty {
                fn decode(raw: &str) -> Option<Self> {
                    raw.trim().parse().ok()
                }
            }
        )*
    };
}

decode_from_str!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl Decode for String {
    fn decode(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl Decode for PathBuf {
    fn decode(raw: &str) -> Option<Self> {
        Some(PathBuf::from(raw))
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(raw: &str) -> Option<Self> {
        raw.split_whitespace().map(T::decode).collect()
    }
}
