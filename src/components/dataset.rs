//! Streaming image-caption dataloader specs.
//!
//! # Responsibilities
//! - Pair `remote`/`local` locations into streams
//! - Pick the crop transform and caption selection policy
//! - Infer SDXL conditioning from the tokenizer
//! - Fill in vision-friendly streaming defaults
//! - Turn each raw sample into model inputs: crop, SDXL microconditioning,
//!   caption drop and caption selection

use anyhow::{bail, ensure, Context};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::components::describe_serialized;
use crate::components::model::{SD2_BASE, SDXL_BASE};
use crate::components::transforms::{Crop, ImageSize};
use crate::config::{OrderedMap, Scalar};
use crate::instantiate::{Args, Component, Construct, Resolved};

const DEFAULT_SHUFFLE_BLOCK_SIZE: i64 = 1 << 18;
const DEFAULT_SHUFFLE_ALGO: &str = "py1s";

/// One remote/local location pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stream {
    pub remote: String,
    pub local: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionSelection {
    First,
    Random,
}

/// SDXL size and crop conditioning, each as a `[x, y]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Microconditioning {
    /// `[top, left]` of the crop.
    pub crops_coords_top_left: [u32; 2],
    /// `[width, height]` before cropping.
    pub original_size: [u32; 2],
    /// `[width, height]` after cropping.
    pub target_size: [u32; 2],
}

/// One sample ready for tokenization and batching.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedSample {
    pub image: ImageSize,
    pub caption: String,
    /// 0.0 only for a dropped caption when dropped captions are zeroed.
    pub drop_caption_mask: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub microconditioning: Option<Microconditioning>,
}

/// A configured streaming dataloader.
#[derive(Debug, Clone, Serialize)]
pub struct StreamingDataLoader {
    pub streams: Vec<Stream>,
    pub batch_size: u64,
    pub tokenizer_name_or_path: String,
    pub sdxl: bool,
    pub caption_drop_prob: f64,
    pub microcond_drop_prob: f64,
    pub resize_size: u32,
    pub caption_selection: CaptionSelection,
    pub crop: Option<Crop>,
    pub transform: Value,
    pub image_key: String,
    pub caption_key: String,
    pub zero_dropped_captions: bool,
    pub streaming_kwargs: Value,
    pub dataloader_kwargs: Value,
}

impl Construct for StreamingDataLoader {
    fn construct(mut args: Args) -> anyhow::Result<Self> {
        let remote: Resolved = args.required("remote")?;
        let local: Resolved = args.required("local")?;
        let batch_size: u64 = args.required("batch_size")?;
        let tokenizer_name_or_path = args.or("tokenizer_name_or_path", SD2_BASE.to_string())?;
        let caption_drop_prob = args.or("caption_drop_prob", 0.0)?;
        let microcond_drop_prob = args.or("microcond_drop_prob", 0.0)?;
        let resize_size = args.or("resize_size", 256u32)?;
        let caption_selection = args.or("caption_selection", "first".to_string())?;
        let transform: Option<Value> = args.optional("transform")?;
        let image_key = args.or("image_key", "image".to_string())?;
        let caption_key = args.or("caption_key", "caption".to_string())?;
        let crop_type: Option<String> = if args.contains("crop_type") {
            args.optional("crop_type")?
        } else {
            Some("square".to_string())
        };
        let zero_dropped_captions = args.or("zero_dropped_captions", true)?;
        let streaming_kwargs: Option<OrderedMap<Resolved>> = args.optional("streaming_kwargs")?;
        let dataloader_kwargs: Option<OrderedMap<Resolved>> = args.optional("dataloader_kwargs")?;
        args.finish()?;

        ensure!(batch_size > 0, "batch_size must be positive");
        ensure!(
            (0.0..=1.0).contains(&caption_drop_prob),
            "caption_drop_prob must be in [0, 1], got {caption_drop_prob}"
        );
        ensure!(
            (0.0..=1.0).contains(&microcond_drop_prob),
            "microcond_drop_prob must be in [0, 1], got {microcond_drop_prob}"
        );

        let streams = pair_streams(remote, local)?;
        let caption_selection = parse_caption_selection(&caption_selection)?;
        let crop = parse_crop(crop_type.as_deref(), resize_size)?;

        let sdxl = tokenizer_name_or_path == SDXL_BASE;
        if sdxl {
            tracing::info!("detected SDXL tokenizer, using SDXL crop transform and tokenizers");
        }

        let transform = transform.unwrap_or_else(|| {
            json!([
                { "transform": "ToTensor" },
                { "transform": "Normalize", "mean": [0.5, 0.5, 0.5], "std": [0.5, 0.5, 0.5] },
            ])
        });

        let mut streaming = kwargs_to_json(streaming_kwargs);
        streaming
            .entry("shuffle_block_size")
            .or_insert_with(|| json!(DEFAULT_SHUFFLE_BLOCK_SIZE));
        streaming
            .entry("shuffle_algo")
            .or_insert_with(|| json!(DEFAULT_SHUFFLE_ALGO));

        Ok(Self {
            streams,
            batch_size,
            tokenizer_name_or_path,
            sdxl,
            caption_drop_prob,
            microcond_drop_prob,
            resize_size,
            caption_selection,
            crop,
            transform,
            image_key,
            caption_key,
            zero_dropped_captions,
            streaming_kwargs: Value::Object(streaming),
            dataloader_kwargs: Value::Object(kwargs_to_json(dataloader_kwargs)),
        })
    }
}

impl StreamingDataLoader {
    /// Apply the per-sample stage to `sample`, a record keyed by
    /// `image_key` (`{width, height}`) and `caption_key` (text or list).
    ///
    /// Random draws happen in a fixed order: crop, the three
    /// microconditioning drops, caption drop, caption choice.
    pub fn prepare_sample<R: Rng + ?Sized>(
        &self,
        sample: &Map<String, Value>,
        rng: &mut R,
    ) -> anyhow::Result<PreparedSample> {
        let raw_image = sample
            .get(&self.image_key)
            .with_context(|| format!("sample has no `{}` field", self.image_key))?;
        let original: ImageSize = serde_json::from_value(raw_image.clone())
            .with_context(|| format!("`{}` must be {{width, height}}", self.image_key))?;

        let (image, top, left) = match &self.crop {
            Some(crop) => {
                let cropped = crop.apply(original, rng)?;
                (cropped.size, cropped.top, cropped.left)
            }
            None => (original, 0, 0),
        };

        let microconditioning = self.sdxl.then(|| {
            let mut cond = Microconditioning {
                crops_coords_top_left: [top, left],
                original_size: [original.width, original.height],
                target_size: [image.width, image.height],
            };
            if rng.gen::<f64>() < self.microcond_drop_prob {
                cond.crops_coords_top_left = [0, 0];
            }
            if rng.gen::<f64>() < self.microcond_drop_prob {
                cond.original_size = [0, 0];
            }
            if rng.gen::<f64>() < self.microcond_drop_prob {
                cond.target_size = [0, 0];
            }
            cond
        });

        let (caption, drop_caption_mask) = if rng.gen::<f64>() < self.caption_drop_prob {
            let mask = if self.zero_dropped_captions { 0.0 } else { 1.0 };
            (String::new(), mask)
        } else {
            (self.select_caption(sample, rng)?, 1.0)
        };

        Ok(PreparedSample {
            image,
            caption,
            drop_caption_mask,
            microconditioning,
        })
    }

    fn select_caption<R: Rng + ?Sized>(
        &self,
        sample: &Map<String, Value>,
        rng: &mut R,
    ) -> anyhow::Result<String> {
        let raw = sample
            .get(&self.caption_key)
            .with_context(|| format!("sample has no `{}` field", self.caption_key))?;
        let chosen = match raw {
            Value::String(text) => return Ok(text.clone()),
            Value::Array(captions) => match self.caption_selection {
                CaptionSelection::First => captions.first(),
                CaptionSelection::Random => captions.choose(rng),
            },
            other => bail!("`{}` must be text or a list of text, got {other}", self.caption_key),
        };
        match chosen {
            Some(Value::String(text)) => Ok(text.clone()),
            Some(other) => bail!("captions must be text, got {other}"),
            None => bail!("`{}` is an empty list", self.caption_key),
        }
    }
}

fn pair_streams(remote: Resolved, local: Resolved) -> anyhow::Result<Vec<Stream>> {
    match (remote, local) {
        (Resolved::Scalar(Scalar::String(remote)), Resolved::Scalar(Scalar::String(local))) => {
            Ok(vec![Stream { remote, local }])
        }
        (Resolved::List(remote), Resolved::List(local)) => {
            ensure!(
                remote.len() == local.len(),
                "remote and local lists must be the same length, got lengths {} and {}",
                remote.len(),
                local.len()
            );
            ensure!(!remote.is_empty(), "remote and local must name at least one stream");
            remote
                .into_iter()
                .zip(local)
                .enumerate()
                .map(|(idx, pair)| match pair {
                    (Resolved::Scalar(Scalar::String(remote)), Resolved::Scalar(Scalar::String(local))) => {
                        Ok(Stream { remote, local })
                    }
                    _ => bail!("remote[{idx}] and local[{idx}] must be strings"),
                })
                .collect()
        }
        (remote, local) => bail!(
            "remote and local must be both strings or both lists, got {} and {}",
            remote.kind(),
            local.kind()
        ),
    }
}

fn parse_caption_selection(raw: &str) -> anyhow::Result<CaptionSelection> {
    match raw.to_ascii_lowercase().as_str() {
        "first" => Ok(CaptionSelection::First),
        "random" => Ok(CaptionSelection::Random),
        other => bail!("invalid caption selection `{other}`, must be one of [random, first]"),
    }
}

fn parse_crop(raw: Option<&str>, resize_size: u32) -> anyhow::Result<Option<Crop>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "square" => Ok(Some(Crop::LargestCenterSquare(resize_size))),
        "random" => Ok(Some(Crop::RandomCropSquare(resize_size))),
        "aspect_ratio" => Ok(Some(Crop::RandomCropAspectRatio)),
        other => bail!("invalid crop_type `{other}`, must be one of [square, random, aspect_ratio, null]"),
    }
}

fn kwargs_to_json(kwargs: Option<OrderedMap<Resolved>>) -> Map<String, Value> {
    kwargs
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.to_json()))
        .collect()
}

impl Component for StreamingDataLoader {
    fn describe(&self) -> Value {
        describe_serialized(self.component_name(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn s(text: &str) -> Resolved {
        Resolved::Scalar(Scalar::String(text.into()))
    }

    fn base(extra: Vec<(&str, Resolved)>) -> Args {
        let mut entries = vec![
            ("remote", s("s3://bucket/laion")),
            ("local", s("/tmp/laion")),
            ("batch_size", Resolved::Scalar(Scalar::Int(16))),
        ];
        entries.extend(extra);
        Args::new(
            "diffusion.datasets.build_streaming_image_caption_dataloader",
            entries.into_iter().collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let loader = StreamingDataLoader::construct(base(vec![])).unwrap();
        assert_eq!(loader.streams.len(), 1);
        assert_eq!(loader.crop, Some(Crop::LargestCenterSquare(256)));
        assert_eq!(loader.caption_selection, CaptionSelection::First);
        assert!(!loader.sdxl);
        assert!(loader.zero_dropped_captions);
        assert_eq!(loader.streaming_kwargs["shuffle_block_size"], 262_144);
        assert_eq!(loader.streaming_kwargs["shuffle_algo"], "py1s");
        assert_eq!(loader.transform[1]["transform"], "Normalize");
    }

    #[test]
    fn test_streaming_kwargs_keep_explicit_values() {
        let kwargs: OrderedMap<Resolved> = vec![
            ("shuffle_algo", s("naive")),
            ("download_timeout", Resolved::Scalar(Scalar::Int(300))),
        ]
        .into_iter()
        .collect();
        let loader = StreamingDataLoader::construct(base(vec![("streaming_kwargs", Resolved::Map(kwargs))])).unwrap();
        assert_eq!(loader.streaming_kwargs["shuffle_algo"], "naive");
        assert_eq!(loader.streaming_kwargs["download_timeout"], 300);
        assert_eq!(loader.streaming_kwargs["shuffle_block_size"], 262_144);
    }

    #[test]
    fn test_stream_lists() {
        let args = Args::new(
            "x.y",
            vec![
                ("remote", Resolved::List(vec![s("r1"), s("r2")])),
                ("local", Resolved::List(vec![s("l1"), s("l2")])),
                ("batch_size", Resolved::Scalar(Scalar::Int(4))),
            ]
            .into_iter()
            .collect(),
        );
        let loader = StreamingDataLoader::construct(args).unwrap();
        assert_eq!(
            loader.streams,
            vec![
                Stream { remote: "r1".into(), local: "l1".into() },
                Stream { remote: "r2".into(), local: "l2".into() },
            ]
        );
    }

    #[test]
    fn test_mismatched_streams() {
        let args = Args::new(
            "x.y",
            vec![
                ("remote", Resolved::List(vec![s("r1"), s("r2")])),
                ("local", Resolved::List(vec![s("l1")])),
                ("batch_size", Resolved::Scalar(Scalar::Int(4))),
            ]
            .into_iter()
            .collect(),
        );
        let err = StreamingDataLoader::construct(args).unwrap_err();
        assert!(err.to_string().contains("same length"));

        let args = Args::new(
            "x.y",
            vec![
                ("remote", s("r1")),
                ("local", Resolved::List(vec![s("l1")])),
                ("batch_size", Resolved::Scalar(Scalar::Int(4))),
            ]
            .into_iter()
            .collect(),
        );
        assert!(StreamingDataLoader::construct(args).is_err());
    }

    #[test]
    fn test_sdxl_and_crop_choices() {
        let loader = StreamingDataLoader::construct(base(vec![
            ("tokenizer_name_or_path", s(SDXL_BASE)),
            ("crop_type", s("ASPECT_RATIO")),
            ("caption_selection", s("Random")),
        ]))
        .unwrap();
        assert!(loader.sdxl);
        assert_eq!(loader.crop, Some(Crop::RandomCropAspectRatio));
        assert_eq!(loader.caption_selection, CaptionSelection::Random);

        let loader = StreamingDataLoader::construct(base(vec![("crop_type", Resolved::null())])).unwrap();
        assert_eq!(loader.crop, None);

        assert!(StreamingDataLoader::construct(base(vec![("crop_type", s("circle"))])).is_err());
        assert!(StreamingDataLoader::construct(base(vec![("caption_selection", s("last"))])).is_err());
    }

    fn sample(caption: Value) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("image".into(), json!({ "width": 512, "height": 256 }));
        record.insert("caption".into(), caption);
        record
    }

    fn float(x: f64) -> Resolved {
        Resolved::Scalar(Scalar::Float(x))
    }

    #[test]
    fn test_prepare_sample_first_caption() {
        let loader = StreamingDataLoader::construct(base(vec![])).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let prepared = loader
            .prepare_sample(&sample(json!(["a dog", "a cat"])), &mut rng)
            .unwrap();
        assert_eq!(prepared.caption, "a dog");
        assert_eq!(prepared.drop_caption_mask, 1.0);
        assert_eq!(prepared.image, ImageSize::new(256, 256));
        assert_eq!(prepared.microconditioning, None);
    }

    #[test]
    fn test_prepare_sample_random_caption_is_seeded() {
        let loader =
            StreamingDataLoader::construct(base(vec![("caption_selection", s("random"))])).unwrap();
        let captions = json!(["one", "two", "three", "four"]);
        let pick = |seed| {
            loader
                .prepare_sample(&sample(captions.clone()), &mut StdRng::seed_from_u64(seed))
                .unwrap()
                .caption
        };
        assert_eq!(pick(5), pick(5));
        let seen: std::collections::HashSet<String> = (0..64).map(pick).collect();
        assert!(seen.len() > 1);
        assert!(seen.iter().all(|c| ["one", "two", "three", "four"].contains(&c.as_str())));

        let single = loader
            .prepare_sample(&sample(json!("only")), &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(single.caption, "only");
    }

    #[test]
    fn test_dropped_caption_mask() {
        let mut rng = StdRng::seed_from_u64(2);
        let zeroed = StreamingDataLoader::construct(base(vec![("caption_drop_prob", float(1.0))])).unwrap();
        let prepared = zeroed.prepare_sample(&sample(json!("kept?")), &mut rng).unwrap();
        assert_eq!(prepared.caption, "");
        assert_eq!(prepared.drop_caption_mask, 0.0);

        let kept_mask = StreamingDataLoader::construct(base(vec![
            ("caption_drop_prob", float(1.0)),
            ("zero_dropped_captions", Resolved::Scalar(Scalar::Bool(false))),
        ]))
        .unwrap();
        let prepared = kept_mask.prepare_sample(&sample(json!("kept?")), &mut rng).unwrap();
        assert_eq!(prepared.caption, "");
        assert_eq!(prepared.drop_caption_mask, 1.0);
    }

    #[test]
    fn test_sdxl_microconditioning() {
        let loader = StreamingDataLoader::construct(base(vec![("tokenizer_name_or_path", s(SDXL_BASE))])).unwrap();
        let prepared = loader
            .prepare_sample(&sample(json!("x")), &mut StdRng::seed_from_u64(4))
            .unwrap();
        assert_eq!(
            prepared.microconditioning,
            Some(Microconditioning {
                crops_coords_top_left: [0, 128],
                original_size: [512, 256],
                target_size: [256, 256],
            })
        );

        let dropped = StreamingDataLoader::construct(base(vec![
            ("tokenizer_name_or_path", s(SDXL_BASE)),
            ("microcond_drop_prob", float(1.0)),
        ]))
        .unwrap();
        let prepared = dropped
            .prepare_sample(&sample(json!("x")), &mut StdRng::seed_from_u64(4))
            .unwrap();
        let cond = prepared.microconditioning.unwrap();
        assert_eq!(cond.crops_coords_top_left, [0, 0]);
        assert_eq!(cond.original_size, [0, 0]);
        assert_eq!(cond.target_size, [0, 0]);
        assert_eq!(prepared.caption, "x");
    }

    #[test]
    fn test_prepare_sample_rejects_bad_records() {
        let loader = StreamingDataLoader::construct(base(vec![("crop_type", Resolved::null())])).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let uncropped = loader.prepare_sample(&sample(json!("x")), &mut rng).unwrap();
        assert_eq!(uncropped.image, ImageSize::new(512, 256));

        assert!(loader.prepare_sample(&sample(json!([])), &mut rng).is_err());
        assert!(loader.prepare_sample(&sample(json!(3)), &mut rng).is_err());
        let mut no_image = sample(json!("x"));
        no_image.remove("image");
        assert!(loader.prepare_sample(&no_image, &mut rng).is_err());
    }

    #[test]
    fn test_probabilities_and_batch_size() {
        let bad = base(vec![("caption_drop_prob", Resolved::Scalar(Scalar::Float(1.5)))]);
        assert!(StreamingDataLoader::construct(bad).is_err());

        let zero = Args::new(
            "x.y",
            vec![
                ("remote", s("r")),
                ("local", s("l")),
                ("batch_size", Resolved::Scalar(Scalar::Int(0))),
            ]
            .into_iter()
            .collect(),
        );
        assert!(StreamingDataLoader::construct(zero).is_err());
    }
}
