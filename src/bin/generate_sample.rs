use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use npyz::WriterBuilder;
use serde_pickle::{HashableValue, SerOptions, Value};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }
}

/// A survey site: name, dialect slice and rough coordinates.
const SITES: [(&str, &str, f64, f64); 8] = [
    ("北京", "官话", 116.4, 39.9),
    ("济南", "官话", 117.0, 36.7),
    ("西安", "官话", 108.9, 34.3),
    ("上海", "吴语", 121.5, 31.2),
    ("苏州", "吴语", 120.6, 31.3),
    ("广州", "粤语", 113.3, 23.1),
    ("厦门", "闽语", 118.1, 24.5),
    ("长沙", "湘语", 112.9, 28.2),
];

const WORDS: [&str; 5] = ["日", "月", "水", "火", "山"];
const INITIALS: [&str; 8] = ["p", "t", "k", "ts", "tɕ", "ʐ", "n", "∅"];
const FINALS: [&str; 8] = ["a", "i", "u", "ən", "aŋ", "yø", "ʅ", "ei"];
const TONES: [&str; 6] = ["55", "35", "214", "51", "13", "22"];

fn strings<S: AsRef<str>>(items: &[S]) -> Value {
    Value::List(items.iter().map(|s| Value::String(s.as_ref().to_string())).collect())
}

fn points(items: &[(f64, f64)]) -> Value {
    Value::List(
        items
            .iter()
            .map(|&(x, y)| Value::Tuple(vec![Value::F64(x), Value::F64(y)]))
            .collect(),
    )
}

fn write_pickle(path: &Path, entries: Vec<(&str, Value)>) {
    let dict: BTreeMap<HashableValue, Value> = entries
        .into_iter()
        .map(|(k, v)| (HashableValue::String(k.to_string()), v))
        .collect();
    let mut file = File::create(path).expect("Failed to create pickle file");
    serde_pickle::value_to_writer(&mut file, &Value::Dict(dict), SerOptions::new())
        .expect("Failed to write pickle");
}

fn npy(n: usize, data: &[f64]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut writer = npyz::WriteOptions::new()
        .default_dtype()
        .shape(&[n as u64, n as u64])
        .writer(&mut buf)
        .begin_nd()
        .expect("Failed to start npy");
    writer.extend(data.iter().copied()).expect("Failed to write npy");
    writer.finish().expect("Failed to finish npy");
    buf
}

/// Share of positions where two sequences differ.
fn mismatch(a: &[&str], b: &[&str]) -> f64 {
    let diff = a.iter().zip(b).filter(|(x, y)| x != y).count();
    diff as f64 / a.len().max(1) as f64
}

fn distance_matrix(readings: &[Vec<&str>]) -> Vec<f64> {
    let mut m = Vec::with_capacity(readings.len() * readings.len());
    for a in readings {
        for b in readings {
            m.push(mismatch(a, b));
        }
    }
    m
}

fn main() {
    let mut rng = SimpleRng::new(42);
    let out = Path::new("Data4");
    std::fs::create_dir_all(out).expect("Failed to create Data4/");

    // One row per (site, word).
    let mut word_name = Vec::new();
    let mut area = Vec::new();
    let mut slice = Vec::new();
    let mut coords = Vec::new();
    let mut initial = Vec::new();
    let mut finals = Vec::new();
    let mut tone = Vec::new();

    // Per-site readings, for the distance matrices.
    let mut site_initials: Vec<Vec<&str>> = Vec::new();
    let mut site_finals: Vec<Vec<&str>> = Vec::new();
    let mut site_tones: Vec<Vec<&str>> = Vec::new();

    for &(site, sl, lon, lat) in &SITES {
        let mut ini = Vec::new();
        let mut fin = Vec::new();
        let mut ton = Vec::new();
        for &word in &WORDS {
            let (i, f, t) = (rng.pick(&INITIALS), rng.pick(&FINALS), rng.pick(&TONES));
            word_name.push(word);
            area.push(site);
            slice.push(sl);
            coords.push((lon + rng.next_f64() * 0.1, lat + rng.next_f64() * 0.1));
            initial.push(i);
            finals.push(f);
            tone.push(t);
            ini.push(i);
            fin.push(f);
            ton.push(t);
        }
        site_initials.push(ini);
        site_finals.push(fin);
        site_tones.push(ton);
    }

    let slices: Vec<&str> = {
        let mut s: Vec<&str> = SITES.iter().map(|s| s.1).collect();
        s.dedup();
        s
    };

    write_pickle(
        &out.join("transcription_areas.pkl"),
        vec![
            ("word_name", strings(&word_name)),
            ("area", strings(&area)),
            ("slice", strings(&slice)),
            ("slices", strings(&slices)),
            ("coords", points(&coords)),
            ("initial", strings(&initial)),
            ("final", strings(&finals)),
            ("tone", strings(&tone)),
        ],
    );

    let site_names: Vec<&str> = SITES.iter().map(|s| s.0).collect();
    let site_slices: Vec<&str> = SITES.iter().map(|s| s.1).collect();
    let site_coords: Vec<(f64, f64)> = SITES.iter().map(|s| (s.2, s.3)).collect();
    write_pickle(
        &out.join("processed_info.pkl"),
        vec![
            ("areas", strings(&site_names)),
            ("slice", strings(&site_slices)),
            ("slices", strings(&slices)),
            ("coords", points(&site_coords)),
            ("word_names", strings(&WORDS)),
        ],
    );

    // Pairwise site distances per phonological component.
    let n = SITES.len();
    let ini = distance_matrix(&site_initials);
    let fin = distance_matrix(&site_finals);
    let ton = distance_matrix(&site_tones);
    let overall: Vec<f64> = (0..n * n).map(|k| (ini[k] + fin[k] + ton[k]) / 3.0).collect();

    let npz_path = out.join("distance_matrices.npz");
    let file = File::create(&npz_path).expect("Failed to create npz file");
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (key, data) in [("initials", &ini), ("finals", &fin), ("tones", &ton), ("overall", &overall)] {
        zip.start_file(format!("{key}.npy"), options)
            .expect("Failed to start npz member");
        zip.write_all(&npy(n, data)).expect("Failed to write npz member");
    }
    zip.finish().expect("Failed to finish npz");

    println!(
        "Wrote {} transcriptions for {} sites to {}/",
        word_name.len(),
        n,
        out.display()
    );
}
