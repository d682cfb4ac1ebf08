//! EfficientNet in the timm parameter layout
//!
//! Weight artifacts are `state_dict`s of `timm.create_model("efficientnet_b*")`
//! with the classifier replaced by a `Linear(num_features, num_classes)`, so
//! parameters are named `conv_stem`, `bn1`, `blocks.{stage}.{index}.*`,
//! `conv_head`, `bn2` and `classifier`.
//!
//! Convolutions pad symmetrically by `((stride - 1) + (kernel - 1)) / 2` and
//! batch norms use eps `1e-5`, as the PyTorch modules the weights were trained
//! in do. Batch norm always runs on its running statistics.

use candle_core::{Module, Result, Tensor, D};
use candle_nn::{ops, BatchNorm, Conv2d, Conv2dConfig, Linear, VarBuilder};

const BN_EPS: f64 = 1e-5;
const CHANNEL_DIVISOR: usize = 8;
const STEM_CHANNELS: usize = 32;
const HEAD_CHANNELS: usize = 1280;
const SE_RATIO: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockType {
    /// `ds`: depthwise conv, squeeze-excite, pointwise projection
    DepthwiseSeparable,
    /// `ir`: pointwise expansion, depthwise conv, squeeze-excite, projection
    InvertedResidual,
}

/// One stage of the unscaled B0 table
#[derive(Debug, Clone, Copy)]
struct StageDef {
    block: BlockType,
    repeats: usize,
    kernel: usize,
    stride: usize,
    expand_ratio: usize,
    channels: usize,
}

const fn stage(
    block: BlockType,
    repeats: usize,
    kernel: usize,
    stride: usize,
    expand_ratio: usize,
    channels: usize,
) -> StageDef {
    StageDef {
        block,
        repeats,
        kernel,
        stride,
        expand_ratio,
        channels,
    }
}

// ds_r1_k3_s1_e1_c16, ir_r2_k3_s2_e6_c24, ... ir_r1_k3_s1_e6_c320 (all se0.25)
const BASE_STAGES: [StageDef; 7] = [
    stage(BlockType::DepthwiseSeparable, 1, 3, 1, 1, 16),
    stage(BlockType::InvertedResidual, 2, 3, 2, 6, 24),
    stage(BlockType::InvertedResidual, 2, 5, 2, 6, 40),
    stage(BlockType::InvertedResidual, 3, 3, 2, 6, 80),
    stage(BlockType::InvertedResidual, 3, 5, 1, 6, 112),
    stage(BlockType::InvertedResidual, 4, 5, 2, 6, 192),
    stage(BlockType::InvertedResidual, 1, 3, 1, 6, 320),
];

/// Compound-scaling coefficients of one EfficientNet variant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EfficientNetConfig {
    pub width_multiplier: f64,
    pub depth_multiplier: f64,
}

impl EfficientNetConfig {
    pub const B0: Self = Self {
        width_multiplier: 1.0,
        depth_multiplier: 1.0,
    };

    pub const B3: Self = Self {
        width_multiplier: 1.2,
        depth_multiplier: 1.4,
    };

    /// Channel count scaled by the width multiplier
    pub fn round_channels(&self, channels: usize) -> usize {
        make_divisible(channels as f64 * self.width_multiplier, CHANNEL_DIVISOR)
    }

    /// Block count of a stage scaled by the depth multiplier
    pub fn round_repeats(&self, repeats: usize) -> usize {
        (repeats as f64 * self.depth_multiplier).ceil() as usize
    }

    /// Output channels of the stem convolution
    pub fn stem_channels(&self) -> usize {
        self.round_channels(STEM_CHANNELS)
    }

    /// Width of the pooled features fed to the classifier
    pub fn num_features(&self) -> usize {
        self.round_channels(HEAD_CHANNELS)
    }

    /// Number of blocks in each of the seven stages
    pub fn stage_depths(&self) -> Vec<usize> {
        BASE_STAGES
            .iter()
            .map(|s| self.round_repeats(s.repeats))
            .collect()
    }
}

/// Round to a multiple of `divisor`, never dropping more than 10%
fn make_divisible(v: f64, divisor: usize) -> usize {
    let rounded = usize::max(
        divisor,
        (v + divisor as f64 / 2.0) as usize / divisor * divisor,
    );
    if (rounded as f64) < 0.9 * v {
        rounded + divisor
    } else {
        rounded
    }
}

fn conv(
    vb: VarBuilder,
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    groups: usize,
    bias: bool,
) -> Result<Conv2d> {
    let cfg = Conv2dConfig {
        padding: ((stride - 1) + (kernel - 1)) / 2,
        stride,
        groups,
        ..Default::default()
    };
    if bias {
        candle_nn::conv2d(in_channels, out_channels, kernel, cfg, vb)
    } else {
        candle_nn::conv2d_no_bias(in_channels, out_channels, kernel, cfg, vb)
    }
}

/// Bias-free convolution followed by a sibling batch norm, optionally SiLU
#[derive(Debug)]
struct ConvBn {
    conv: Conv2d,
    bn: BatchNorm,
    activation: bool,
}

impl ConvBn {
    #[allow(clippy::too_many_arguments)]
    fn new(
        vb: &VarBuilder,
        conv_name: &str,
        bn_name: &str,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        activation: bool,
    ) -> Result<Self> {
        Ok(Self {
            conv: conv(
                vb.pp(conv_name),
                in_channels,
                out_channels,
                kernel,
                stride,
                groups,
                false,
            )?,
            bn: candle_nn::batch_norm(out_channels, BN_EPS, vb.pp(bn_name))?,
            activation,
        })
    }
}

impl Module for ConvBn {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.conv.forward(xs)?.apply_t(&self.bn, false)?;
        if self.activation {
            ops::silu(&xs)
        } else {
            Ok(xs)
        }
    }
}

#[derive(Debug)]
struct SqueezeExcite {
    conv_reduce: Conv2d,
    conv_expand: Conv2d,
}

impl SqueezeExcite {
    fn new(vb: VarBuilder, channels: usize, reduced: usize) -> Result<Self> {
        Ok(Self {
            conv_reduce: conv(vb.pp("conv_reduce"), channels, reduced, 1, 1, 1, true)?,
            conv_expand: conv(vb.pp("conv_expand"), reduced, channels, 1, 1, 1, true)?,
        })
    }
}

impl Module for SqueezeExcite {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let gate = xs.mean_keepdim(D::Minus2)?.mean_keepdim(D::Minus1)?;
        let gate = ops::silu(&self.conv_reduce.forward(&gate)?)?;
        let gate = ops::sigmoid(&self.conv_expand.forward(&gate)?)?;
        xs.broadcast_mul(&gate)
    }
}

#[derive(Debug)]
enum Block {
    DepthwiseSeparable {
        dw: ConvBn,
        se: SqueezeExcite,
        pw: ConvBn,
        skip: bool,
    },
    InvertedResidual {
        expand: ConvBn,
        dw: ConvBn,
        se: SqueezeExcite,
        project: ConvBn,
        skip: bool,
    },
}

impl Block {
    fn new(
        vb: VarBuilder,
        block: BlockType,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        expand_ratio: usize,
    ) -> Result<Self> {
        let skip = stride == 1 && in_channels == out_channels;
        // Squeeze width is a fraction of the block input, not of the expansion.
        let reduced = usize::max(1, (in_channels as f64 * SE_RATIO).round() as usize);

        match block {
            BlockType::DepthwiseSeparable => Ok(Self::DepthwiseSeparable {
                dw: ConvBn::new(
                    &vb, "conv_dw", "bn1", in_channels, in_channels, kernel, stride, in_channels,
                    true,
                )?,
                se: SqueezeExcite::new(vb.pp("se"), in_channels, reduced)?,
                pw: ConvBn::new(&vb, "conv_pw", "bn2", in_channels, out_channels, 1, 1, 1, false)?,
                skip,
            }),
            BlockType::InvertedResidual => {
                let mid = make_divisible((in_channels * expand_ratio) as f64, CHANNEL_DIVISOR);
                Ok(Self::InvertedResidual {
                    expand: ConvBn::new(&vb, "conv_pw", "bn1", in_channels, mid, 1, 1, 1, true)?,
                    dw: ConvBn::new(&vb, "conv_dw", "bn2", mid, mid, kernel, stride, mid, true)?,
                    se: SqueezeExcite::new(vb.pp("se"), mid, reduced)?,
                    project: ConvBn::new(
                        &vb, "conv_pwl", "bn3", mid, out_channels, 1, 1, 1, false,
                    )?,
                    skip,
                })
            }
        }
    }
}

impl Module for Block {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (ys, skip) = match self {
            Self::DepthwiseSeparable { dw, se, pw, skip } => {
                (xs.apply(dw)?.apply(se)?.apply(pw)?, *skip)
            }
            Self::InvertedResidual {
                expand,
                dw,
                se,
                project,
                skip,
            } => (
                xs.apply(expand)?.apply(dw)?.apply(se)?.apply(project)?,
                *skip,
            ),
        };
        if skip {
            ys + xs
        } else {
            Ok(ys)
        }
    }
}

/// Inference-only EfficientNet with a `num_classes`-wide linear head
#[derive(Debug)]
pub struct EfficientNet {
    stem: ConvBn,
    blocks: Vec<Block>,
    head: ConvBn,
    classifier: Linear,
}

impl EfficientNet {
    pub fn new(vb: VarBuilder, config: EfficientNetConfig, num_classes: usize) -> Result<Self> {
        let stem_channels = config.stem_channels();
        let stem = ConvBn::new(&vb, "conv_stem", "bn1", 3, stem_channels, 3, 2, 1, true)?;

        let mut blocks = Vec::new();
        let mut in_channels = stem_channels;
        for (stage_idx, def) in BASE_STAGES.iter().enumerate() {
            let out_channels = config.round_channels(def.channels);
            let stage_vb = vb.pp("blocks").pp(stage_idx);
            for block_idx in 0..config.round_repeats(def.repeats) {
                let stride = if block_idx == 0 { def.stride } else { 1 };
                blocks.push(Block::new(
                    stage_vb.pp(block_idx),
                    def.block,
                    in_channels,
                    out_channels,
                    def.kernel,
                    stride,
                    def.expand_ratio,
                )?);
                in_channels = out_channels;
            }
        }

        let num_features = config.num_features();
        let head = ConvBn::new(&vb, "conv_head", "bn2", in_channels, num_features, 1, 1, 1, true)?;
        let classifier = candle_nn::linear(num_features, num_classes, vb.pp("classifier"))?;

        Ok(Self {
            stem,
            blocks,
            head,
            classifier,
        })
    }
}

impl Module for EfficientNet {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = self.stem.forward(xs)?;
        for block in &self.blocks {
            xs = block.forward(&xs)?;
        }
        // Global average pool over H and W
        let xs = self.head.forward(&xs)?.mean(D::Minus1)?.mean(D::Minus1)?;
        self.classifier.forward(&xs)
    }
}
